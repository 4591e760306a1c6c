// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded per-user conversation memory on top of a [`KeyedStore`].
//!
//! A history is a list of JSON-encoded [`ConversationEntry`] values, oldest
//! first. After every append the list is held to `max_entries` entries and
//! `max_chars` aggregate content characters. There is no per-user lock: two
//! concurrent appends for the same user may interleave, and whatever bound
//! overshoot that causes is corrected by the next append.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, Local, NaiveDate, TimeZone};
use parley_config::MemoryConfig;
use parley_core::{
    ConversationEntry, KeyedStore, ParleyError, PendingFileMeta, QuotaCounter, Role, UserId,
};
use tracing::{debug, warn};

use crate::keys::KeySpace;

/// Bounds applied to each user's history.
#[derive(Debug, Clone)]
pub struct ConversationLimits {
    pub max_entries: usize,
    /// Aggregate character budget. A single entry is truncated to this length on insert.
    pub max_chars: usize,
    pub conversation_ttl: Duration,
    pub pending_file_ttl: Duration,
    pub retention: chrono::Duration,
}

impl Default for ConversationLimits {
    fn default() -> Self {
        Self::from(&MemoryConfig::default())
    }
}

impl From<&MemoryConfig> for ConversationLimits {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_chars: config.max_chars,
            conversation_ttl: Duration::from_secs(config.conversation_ttl_secs),
            pending_file_ttl: Duration::from_secs(config.pending_file_ttl_secs),
            retention: chrono::Duration::days(i64::from(config.retention_days)),
        }
    }
}

/// Per-user session state: history, last image, pending file, daily quota.
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn KeyedStore>,
    keys: KeySpace,
    limits: ConversationLimits,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KeyedStore>, keys: KeySpace, limits: ConversationLimits) -> Self {
        Self {
            store,
            keys,
            limits,
        }
    }

    pub fn limits(&self) -> &ConversationLimits {
        &self.limits
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn backend(&self) -> &Arc<dyn KeyedStore> {
        &self.store
    }

    /// Appends one entry and re-establishes the history bounds.
    ///
    /// Store failures propagate: a silently lost write would break the
    /// continuity the caller relies on.
    pub async fn append_message(
        &self,
        user: UserId,
        role: Role,
        content: &str,
    ) -> Result<(), ParleyError> {
        let key = self.keys.conversation(user);
        let content = truncate_chars(content, self.limits.max_chars);
        let entry = ConversationEntry::new(role, content);
        let encoded = serde_json::to_string(&entry)
            .map_err(|e| ParleyError::Internal(format!("encode conversation entry: {e}")))?;

        let len = self.store.list_push(&key, encoded).await?;
        if len > self.limits.max_entries {
            self.store
                .list_trim_to_last(&key, self.limits.max_entries)
                .await?;
        }

        let raw = self.store.list_range(&key).await?;
        let sizes: Vec<(Option<Role>, usize)> = raw
            .iter()
            .map(|item| match decode_entry(item) {
                Some(e) => (Some(e.role), e.char_len()),
                None => (None, 0),
            })
            .collect();
        let evict = plan_eviction(&sizes, self.limits.max_chars);
        if evict > 0 {
            debug!(user_id = %user, evict, "evicting oldest entries over char budget");
            self.store.list_pop_front(&key, evict).await?;
        }

        self.store
            .expire(&key, self.limits.conversation_ttl)
            .await
    }

    /// Returns the history oldest to newest.
    ///
    /// Undecodable entries are skipped. A store failure degrades to an empty
    /// history so a turn can still be answered without context.
    pub async fn get_history(&self, user: UserId) -> Vec<ConversationEntry> {
        let key = self.keys.conversation(user);
        match self.store.list_range(&key).await {
            Ok(raw) => raw.iter().filter_map(|item| decode_entry(item)).collect(),
            Err(e) => {
                warn!(user_id = %user, error = %e, "history read failed, continuing without context");
                Vec::new()
            }
        }
    }

    pub async fn clear_history(&self, user: UserId) -> Result<(), ParleyError> {
        self.store.del(&self.keys.conversation(user)).await
    }

    /// Stores the most recent image as a data URL, replacing any previous one.
    pub async fn set_last_image(&self, user: UserId, data_url: &str) -> Result<(), ParleyError> {
        self.store
            .set_ex(
                &self.keys.last_image(user),
                data_url.to_string(),
                self.limits.conversation_ttl,
            )
            .await
    }

    /// The most recent image, if any. Store failures read as a cache miss.
    pub async fn get_last_image(&self, user: UserId) -> Option<String> {
        match self.store.get(&self.keys.last_image(user)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(user_id = %user, error = %e, "last image read failed");
                None
            }
        }
    }

    /// Records an uploaded file for the next text turn, replacing any previous one.
    pub async fn set_pending_file(
        &self,
        user: UserId,
        meta: &PendingFileMeta,
    ) -> Result<(), ParleyError> {
        let encoded = serde_json::to_string(meta)
            .map_err(|e| ParleyError::Internal(format!("encode pending file: {e}")))?;
        self.store
            .set_ex(
                &self.keys.pending_file(user),
                encoded,
                self.limits.pending_file_ttl,
            )
            .await
    }

    /// Returns the pending file and removes it, so it is used at most once.
    pub async fn take_pending_file(&self, user: UserId) -> Option<PendingFileMeta> {
        let key = self.keys.pending_file(user);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(user_id = %user, error = %e, "pending file read failed");
                return None;
            }
        };
        if let Err(e) = self.store.del(&key).await {
            warn!(user_id = %user, error = %e, "pending file delete failed");
        }
        match serde_json::from_str(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(user_id = %user, error = %e, "discarding undecodable pending file");
                None
            }
        }
    }

    /// Increments the counter for `day`, setting `ttl` on its first increment.
    pub(crate) async fn increment_daily_count_on(
        &self,
        user: UserId,
        day: NaiveDate,
        ttl: Duration,
    ) -> Result<u32, ParleyError> {
        let key = self.keys.daily_quota(user, day);
        let count = self.store.incr(&key).await?;
        if count == 1 {
            self.store.expire(&key, ttl).await?;
        }
        Ok(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl QuotaCounter for ConversationStore {
    /// The key carries the local date and expires at the next local midnight,
    /// so the first call of a new day always returns 1.
    async fn increment_daily_base_count(&self, user: UserId) -> Result<u32, ParleyError> {
        let now = Local::now();
        let ttl = Duration::from_secs(seconds_until_local_midnight(now));
        self.increment_daily_count_on(user, now.date_naive(), ttl)
            .await
    }
}

/// Whole seconds from `now` until the next local midnight, at least 1.
pub fn seconds_until_local_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> u64 {
    let tz = now.timezone();
    let next_midnight = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| tz.from_local_datetime(&naive).earliest());
    match next_midnight {
        Some(midnight) => midnight
            .signed_duration_since(&now)
            .num_seconds()
            .max(1) as u64,
        // Midnight skipped by a DST jump: fall back to a full day.
        None => 24 * 60 * 60,
    }
}

pub(crate) fn decode_entry(raw: &str) -> Option<ConversationEntry> {
    match serde_json::from_str(raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            debug!(error = %e, "skipping undecodable conversation entry");
            None
        }
    }
}

fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &content[..byte_idx],
        None => content,
    }
}

/// How many entries to drop from the front so the rest fit in `max_chars`.
///
/// When the oldest remaining entry is a user turn directly followed by an
/// assistant turn, and dropping the user turn alone would still leave the
/// history over budget, the pair goes together so no orphan reply is left.
pub fn plan_eviction(sizes: &[(Option<Role>, usize)], max_chars: usize) -> usize {
    let mut total: usize = sizes.iter().map(|(_, len)| len).sum();
    let mut i = 0;
    while total > max_chars && i < sizes.len() {
        let (role, len) = sizes[i];
        let pair_next = sizes
            .get(i + 1)
            .filter(|(next_role, _)| {
                role == Some(Role::User) && *next_role == Some(Role::Assistant)
            })
            .map(|(_, next_len)| *next_len);
        match pair_next {
            Some(next_len) if total - len > max_chars => {
                total -= len + next_len;
                i += 2;
            }
            _ => {
                total -= len;
                i += 1;
            }
        }
    }
    i
}
