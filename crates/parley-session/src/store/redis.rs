// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis-backed keyed store.
//!
//! Each call clones the `ConnectionManager`, which reconnects on its own
//! after a dropped connection.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::{AdapterType, HealthStatus, KeyedStore, ParleyError, PluginAdapter};
use redis::aio::ConnectionManager;
use tracing::debug;

/// Page size hint for `SCAN`.
const SCAN_COUNT: usize = 200;

/// [`KeyedStore`] over a shared Redis instance.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl RedisStore {
    /// Connects to `url` (`redis://host:port/db`).
    pub async fn connect(url: &str) -> Result<Self, ParleyError> {
        let client = redis::Client::open(url).map_err(ParleyError::store)?;
        let connection_manager = client
            .get_connection_manager()
            .await
            .map_err(ParleyError::store)?;
        debug!("redis store connected");
        Ok(Self { connection_manager })
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, ParleyError> {
        let mut conn = self.connection_manager.clone();
        cmd.query_async(&mut conn).await.map_err(ParleyError::store)
    }
}

/// Redis TTLs are whole seconds; anything shorter would delete the key.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl PluginAdapter for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        match self.query::<String>(&redis::cmd("PING")).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl KeyedStore for RedisStore {
    async fn list_push(&self, key: &str, value: String) -> Result<usize, ParleyError> {
        self.query(redis::cmd("RPUSH").arg(key).arg(value)).await
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        self.query(redis::cmd("LRANGE").arg(key).arg(0).arg(-1)).await
    }

    async fn list_trim_to_last(&self, key: &str, keep: usize) -> Result<(), ParleyError> {
        if keep == 0 {
            return self.del(key).await;
        }
        let start = -(keep as i64);
        self.query(redis::cmd("LTRIM").arg(key).arg(start).arg(-1))
            .await
    }

    async fn list_pop_front(&self, key: &str, count: usize) -> Result<(), ParleyError> {
        if count == 0 {
            return Ok(());
        }
        let _: Option<Vec<String>> = self
            .query(redis::cmd("LPOP").arg(key).arg(count))
            .await?;
        Ok(())
    }

    async fn list_replace(&self, key: &str, values: Vec<String>) -> Result<(), ParleyError> {
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("DEL").arg(key).ignore();
        if !values.is_empty() {
            pipe.cmd("RPUSH").arg(key).arg(values).ignore();
        }
        let mut conn = self.connection_manager.clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(ParleyError::store)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), ParleyError> {
        self.query(
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs(ttl)),
        )
        .await
    }

    async fn incr(&self, key: &str) -> Result<i64, ParleyError> {
        self.query(redis::cmd("INCR").arg(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), ParleyError> {
        let _: i64 = self
            .query(redis::cmd("EXPIRE").arg(key).arg(ttl_secs(ttl)))
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), ParleyError> {
        let _: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ParleyError> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .query(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_second_ttl_rounds_up() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(90)), 90);
    }

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let result = RedisStore::connect("not a url").await;
        assert!(matches!(result, Err(ParleyError::Store { .. })));
    }
}
