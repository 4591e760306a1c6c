// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user session state for the Parley bot backend.
//!
//! [`ConversationStore`] keeps each user's bounded history, last image,
//! pending file and daily quota counter in a shared [`KeyedStore`]
//! (in-memory or Redis), and prunes aged entries with a periodic sweep.
//!
//! [`KeyedStore`]: parley_core::KeyedStore

pub mod conversation;
pub mod keys;
pub mod store;
pub mod sweep;

pub use conversation::{
    plan_eviction, seconds_until_local_midnight, ConversationLimits, ConversationStore,
};
pub use keys::KeySpace;
pub use store::{open_store, MemoryStore, RedisStore, StoreError};
pub use sweep::SweepReport;
