// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key layout for per-user records.

use chrono::NaiveDate;
use parley_core::UserId;

/// Builds the namespaced keys for every per-user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn conversation(&self, user: UserId) -> String {
        format!("{}:conv:{user}", self.prefix)
    }

    /// Glob matching every conversation key, for the sweep.
    pub fn conversation_pattern(&self) -> String {
        format!("{}:conv:*", self.prefix)
    }

    pub fn last_image(&self, user: UserId) -> String {
        format!("{}:last_image:{user}", self.prefix)
    }

    pub fn pending_file(&self, user: UserId) -> String {
        format!("{}:pending_file:{user}", self.prefix)
    }

    pub fn daily_quota(&self, user: UserId, day: NaiveDate) -> String {
        format!("{}:quota:base:{user}:{}", self.prefix, day.format("%Y-%m-%d"))
    }
}
