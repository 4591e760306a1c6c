// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Balance, subscription, and quota oracles consumed by the access gate.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::UserId;

/// The external SP balance ledger.
#[async_trait]
pub trait BalanceOracle: Send + Sync + 'static {
    /// Whether the user's balance covers `amount`.
    async fn have(&self, user: UserId, amount: f64) -> Result<bool, ParleyError>;

    /// Deducts `amount` from the user's balance.
    ///
    /// Fails with `DomainError::InsufficientFunds` or `DomainError::UserNotFound`.
    async fn deduct(&self, user: UserId, amount: f64, description: &str)
    -> Result<(), ParleyError>;

    /// Current balance of the user (zero for unknown users).
    async fn get_balance(&self, user: UserId) -> Result<f64, ParleyError>;
}

/// Read-only view of subscription status.
#[async_trait]
pub trait SubscriptionOracle: Send + Sync + 'static {
    /// Whether an active subscription covers the current instant.
    async fn is_active_subscription(&self, user: UserId) -> Result<bool, ParleyError>;
}

/// Per-user daily counter for free BASE-tier usage.
#[async_trait]
pub trait QuotaCounter: Send + Sync + 'static {
    /// Increments today's counter and returns the post-increment value.
    async fn increment_daily_base_count(&self, user: UserId) -> Result<u32, ParleyError>;
}
