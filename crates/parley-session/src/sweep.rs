// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aged-entry sweep over every conversation key.

use chrono::{DateTime, Utc};
use parley_core::ParleyError;
use tracing::{debug, info, warn};

use crate::conversation::{decode_entry, ConversationStore};

/// Outcome counts of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    /// Keys rewritten with fewer entries.
    pub rewritten: usize,
    /// Keys deleted because nothing recent was left.
    pub deleted: usize,
    /// Keys skipped after a store error.
    pub failed: usize,
}

enum KeyOutcome {
    Unchanged,
    Rewritten,
    Deleted,
}

impl ConversationStore {
    /// Drops entries older than the retention window from every history.
    ///
    /// A failure on one key is logged and counted; the pass moves on to the
    /// next key. Only a failure to enumerate keys aborts the sweep.
    pub async fn sweep_aged(&self) -> Result<SweepReport, ParleyError> {
        self.sweep_aged_at(Utc::now()).await
    }

    /// [`sweep_aged`](Self::sweep_aged) against an explicit clock.
    pub async fn sweep_aged_at(&self, now: DateTime<Utc>) -> Result<SweepReport, ParleyError> {
        let cutoff = now - self.limits().retention;
        let keys = self
            .backend()
            .scan(&self.keys().conversation_pattern())
            .await?;

        let mut report = SweepReport::default();
        for key in keys {
            report.scanned += 1;
            match self.sweep_key(&key, cutoff).await {
                Ok(KeyOutcome::Unchanged) => {}
                Ok(KeyOutcome::Rewritten) => report.rewritten += 1,
                Ok(KeyOutcome::Deleted) => report.deleted += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "sweep failed for key, skipping");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            rewritten = report.rewritten,
            deleted = report.deleted,
            failed = report.failed,
            "conversation sweep finished"
        );
        Ok(report)
    }

    async fn sweep_key(&self, key: &str, cutoff: DateTime<Utc>) -> Result<KeyOutcome, ParleyError> {
        let raw = self.backend().list_range(key).await?;
        let kept: Vec<String> = raw
            .iter()
            .filter(|item| decode_entry(item).is_some_and(|e| e.timestamp >= cutoff))
            .cloned()
            .collect();

        if kept.len() == raw.len() {
            return Ok(KeyOutcome::Unchanged);
        }

        debug!(key = %key, dropped = raw.len() - kept.len(), "pruning aged entries");
        if kept.is_empty() {
            self.backend().del(key).await?;
            return Ok(KeyOutcome::Deleted);
        }
        self.backend().list_replace(key, kept).await?;
        self.backend()
            .expire(key, self.limits().conversation_ttl)
            .await?;
        Ok(KeyOutcome::Rewritten)
    }
}
