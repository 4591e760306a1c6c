// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background aged-entry sweep.

use std::time::Duration;

use parley_session::ConversationStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs [`ConversationStore::sweep_aged`] on a fixed interval.
pub struct SweepScheduler {
    conversations: ConversationStore,
    interval: Duration,
}

impl SweepScheduler {
    pub fn new(conversations: ConversationStore, interval: Duration) -> Self {
        Self {
            conversations,
            interval,
        }
    }

    /// Sweeps once per interval until `cancel` fires. Returns the number of
    /// completed passes.
    ///
    /// The first pass runs one interval after start. A failed pass is logged
    /// and the schedule continues.
    pub async fn run(self, cancel: CancellationToken) -> usize {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the first immediate tick.
        interval.tick().await;

        let mut passes = 0;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.conversations.sweep_aged().await {
                        Ok(report) => {
                            passes += 1;
                            info!(
                                scanned = report.scanned,
                                rewritten = report.rewritten,
                                deleted = report.deleted,
                                failed = report.failed,
                                "scheduled sweep finished"
                            );
                        }
                        Err(e) => warn!(error = %e, "scheduled sweep failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!(passes, "sweep scheduler shutting down");
                    break;
                }
            }
        }
        passes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, Utc};
    use parley_core::{ConversationEntry, KeyedStore, Role, UserId};
    use parley_session::{ConversationLimits, KeySpace, MemoryStore};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_schedule_until_cancelled() {
        let store = Arc::new(MemoryStore::new());
        let conversations = ConversationStore::new(
            store.clone(),
            KeySpace::new("t"),
            ConversationLimits::default(),
        );
        let key = conversations.keys().conversation(UserId(1));
        let mut old = ConversationEntry::new(Role::User, "ancient");
        old.timestamp = Utc::now() - ChronoDuration::days(90);
        store
            .list_push(&key, serde_json::to_string(&old).unwrap())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let scheduler = SweepScheduler::new(conversations.clone(), Duration::from_secs(60));
        let handle = tokio::spawn(scheduler.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.list_range(&key).await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(store.list_range(&key).await.unwrap().is_empty());

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), 1);
    }
}
