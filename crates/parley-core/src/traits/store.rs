// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed store trait for per-user session state (in-memory, Redis).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;

/// A shared keyed store with list, string, and counter values.
///
/// Every call addresses exactly one key; there are no multi-key transactions.
/// List values are ordered oldest (front) to newest (back).
#[async_trait]
pub trait KeyedStore: PluginAdapter {
    /// Appends a value to the back of a list, returning the new length.
    async fn list_push(&self, key: &str, value: String) -> Result<usize, ParleyError>;

    /// Returns the whole list, front to back. Missing keys yield an empty list.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, ParleyError>;

    /// Keeps only the last `keep` elements of a list.
    async fn list_trim_to_last(&self, key: &str, keep: usize) -> Result<(), ParleyError>;

    /// Removes up to `count` elements from the front of a list.
    async fn list_pop_front(&self, key: &str, count: usize) -> Result<(), ParleyError>;

    /// Replaces the list with `values`, preserving the key's TTL semantics
    /// of a fresh write (no TTL until `expire` is called).
    async fn list_replace(&self, key: &str, values: Vec<String>) -> Result<(), ParleyError>;

    /// Reads a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError>;

    /// Writes a string value with a time-to-live.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), ParleyError>;

    /// Atomically increments a counter, returning the post-increment value.
    async fn incr(&self, key: &str) -> Result<i64, ParleyError>;

    /// Sets the time-to-live of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), ParleyError>;

    /// Deletes a key. Deleting a missing key is not an error.
    async fn del(&self, key: &str) -> Result<(), ParleyError>;

    /// Enumerates keys matching a glob pattern (`prefix:*`).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ParleyError>;
}
