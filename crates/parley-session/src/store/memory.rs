// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local keyed store backed by `dashmap`.
//!
//! Expiry is lazy: an expired key is removed the next time any operation
//! touches it, or when `scan` walks past it. The clock is
//! `tokio::time::Instant`, so paused-time tests can advance past a TTL.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_core::{AdapterType, HealthStatus, KeyedStore, ParleyError, PluginAdapter};
use tokio::time::Instant;

use super::StoreError;

#[derive(Debug, Clone)]
enum Value {
    List(VecDeque<String>),
    Text(String),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`KeyedStore`] for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the key if its TTL has passed.
    fn evict_expired(&self, key: &str) {
        let now = Instant::now();
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));
    }

    fn wrong_type(key: &str) -> ParleyError {
        ParleyError::store(StoreError::WrongType {
            key: key.to_string(),
        })
    }

    /// Remaining time-to-live of a key, if it exists and has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.evict_expired(key);
        let now = Instant::now();
        self.slots
            .get(key)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Matches a Redis-style glob where only `*` is special.
pub(crate) fn glob_match(pattern: &str, candidate: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return candidate.is_empty();
    };
    let Some(mut rest) = candidate.strip_prefix(first) else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.slots.clear();
        Ok(())
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn list_push(&self, key: &str, value: String) -> Result<usize, ParleyError> {
        self.evict_expired(key);
        let mut slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(Value::List(VecDeque::new())));
        match &mut slot.value {
            Value::List(list) => {
                list.push_back(value);
                Ok(list.len())
            }
            Value::Text(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        self.evict_expired(key);
        match self.slots.get(key).map(|slot| slot.value.clone()) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(list.into_iter().collect()),
            Some(Value::Text(_)) => Err(Self::wrong_type(key)),
        }
    }

    async fn list_trim_to_last(&self, key: &str, keep: usize) -> Result<(), ParleyError> {
        self.evict_expired(key);
        let emptied = match self.slots.get_mut(key) {
            None => return Ok(()),
            Some(mut slot) => match &mut slot.value {
                Value::List(list) => {
                    let excess = list.len().saturating_sub(keep);
                    list.drain(..excess);
                    list.is_empty()
                }
                Value::Text(_) => return Err(Self::wrong_type(key)),
            },
        };
        // Redis deletes a list once its last element is gone.
        if emptied {
            self.slots.remove(key);
        }
        Ok(())
    }

    async fn list_pop_front(&self, key: &str, count: usize) -> Result<(), ParleyError> {
        self.evict_expired(key);
        let emptied = match self.slots.get_mut(key) {
            None => return Ok(()),
            Some(mut slot) => match &mut slot.value {
                Value::List(list) => {
                    let n = count.min(list.len());
                    list.drain(..n);
                    list.is_empty()
                }
                Value::Text(_) => return Err(Self::wrong_type(key)),
            },
        };
        if emptied {
            self.slots.remove(key);
        }
        Ok(())
    }

    async fn list_replace(&self, key: &str, values: Vec<String>) -> Result<(), ParleyError> {
        if values.is_empty() {
            self.slots.remove(key);
        } else {
            self.slots
                .insert(key.to_string(), Slot::new(Value::List(values.into())));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.evict_expired(key);
        match self.slots.get(key).map(|slot| slot.value.clone()) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text)),
            Some(Value::List(_)) => Err(Self::wrong_type(key)),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), ParleyError> {
        self.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Text(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, ParleyError> {
        self.evict_expired(key);
        match self.slots.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(Value::Text("1".to_string())));
                Ok(1)
            }
            Entry::Occupied(mut occupied) => match &mut occupied.get_mut().value {
                Value::Text(text) => {
                    let next = text
                        .parse::<i64>()
                        .map_err(|_| {
                            ParleyError::store(StoreError::NotAnInteger {
                                key: key.to_string(),
                            })
                        })?
                        .checked_add(1)
                        .ok_or_else(|| {
                            ParleyError::store(StoreError::NotAnInteger {
                                key: key.to_string(),
                            })
                        })?;
                    *text = next.to_string();
                    Ok(next)
                }
                Value::List(_) => Err(Self::wrong_type(key)),
            },
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), ParleyError> {
        self.evict_expired(key);
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), ParleyError> {
        self.slots.remove(key);
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ParleyError> {
        let now = Instant::now();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        let mut keys: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
