// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`KeyedStore`](parley_core::KeyedStore) backends.

pub mod memory;
pub mod redis;

use std::sync::Arc;

use parley_config::{StoreBackend, StoreConfig};
use parley_core::{KeyedStore, ParleyError};
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Failures raised by the in-process backend. Redis reports its own.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("WRONGTYPE operation against key `{key}` holding the wrong kind of value")]
    WrongType { key: String },

    #[error("value at `{key}` is not an integer or out of range")]
    NotAnInteger { key: String },
}

/// Opens the backend selected by `[store]`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn KeyedStore>, ParleyError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                ParleyError::Config("store.redis_url is required for the redis backend".into())
            })?;
            Ok(Arc::new(RedisStore::connect(url).await?))
        }
    }
}
