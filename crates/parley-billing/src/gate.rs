// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access / pricing gate.
//!
//! Decides whether a turn may run and what it costs. Free BASE-tier usage
//! without a subscription is limited by the daily counter and never touches
//! the balance ledger. Everything else must be covered by the balance, and
//! is charged through [`AccessGate::deduct_if_needed`] only after the
//! gateway call succeeded.

use std::sync::Arc;

use parley_core::{BalanceOracle, ParleyError, QuotaCounter, SubscriptionOracle, Tier, UserId};
use serde::Serialize;
use strum::Display;
use tracing::{debug, info};

use crate::pricing::PricingTable;

/// Why a turn was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    InsufficientFunds,
    DailyLimitReached,
}

/// Outcome of [`AccessGate::check_access`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    /// Price of the turn in SP, multiplier applied. Nominal for BASE-tier turns.
    pub price: f64,
    pub reason: Option<DenyReason>,
}

impl AccessDecision {
    fn allow(price: f64) -> Self {
        Self {
            allowed: true,
            price,
            reason: None,
        }
    }

    fn deny(price: f64, reason: DenyReason) -> Self {
        Self {
            allowed: false,
            price,
            reason: Some(reason),
        }
    }
}

/// Eligibility and post-success billing for model calls.
#[derive(Clone)]
pub struct AccessGate {
    pricing: Arc<PricingTable>,
    subscriptions: Arc<dyn SubscriptionOracle>,
    balance: Arc<dyn BalanceOracle>,
    quota: Arc<dyn QuotaCounter>,
    daily_base_limit: u32,
}

impl AccessGate {
    pub fn new(
        pricing: Arc<PricingTable>,
        subscriptions: Arc<dyn SubscriptionOracle>,
        balance: Arc<dyn BalanceOracle>,
        quota: Arc<dyn QuotaCounter>,
        daily_base_limit: u32,
    ) -> Self {
        Self {
            pricing,
            subscriptions,
            balance,
            quota,
            daily_base_limit,
        }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Decides whether `user` may call `model` now.
    ///
    /// A free BASE-tier check consumes one unit of the daily quota even
    /// if the call later fails.
    pub async fn check_access(
        &self,
        user: UserId,
        model: &str,
        multiplier: f64,
    ) -> Result<AccessDecision, ParleyError> {
        let tier = self.pricing.tier(model)?;
        let has_sub = self.subscriptions.is_active_subscription(user).await?;
        let price = self.pricing.effective_price(model, has_sub)? * multiplier;

        if tier == Tier::Base && !has_sub {
            let used = self.quota.increment_daily_base_count(user).await?;
            if used > self.daily_base_limit {
                debug!(user_id = %user, used, limit = self.daily_base_limit, "daily base limit reached");
                return Ok(AccessDecision::deny(price, DenyReason::DailyLimitReached));
            }
            return Ok(AccessDecision::allow(price));
        }

        if !self.balance.have(user, price).await? {
            debug!(user_id = %user, model, price, "insufficient funds");
            return Ok(AccessDecision::deny(price, DenyReason::InsufficientFunds));
        }
        Ok(AccessDecision::allow(price))
    }

    /// Charges a completed call. BASE-tier models are never billed.
    ///
    /// Returns whether a deduction was made.
    pub async fn deduct_if_needed(
        &self,
        user: UserId,
        model: &str,
        price: f64,
        description: &str,
    ) -> Result<bool, ParleyError> {
        if self.pricing.tier(model)? == Tier::Base {
            return Ok(false);
        }
        self.balance.deduct(user, price, description).await?;
        info!(user_id = %user, model, price, "turn billed");
        Ok(true)
    }
}
