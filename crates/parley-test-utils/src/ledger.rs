// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory balance and subscription oracle.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parley_core::{BalanceOracle, DomainError, ParleyError, SubscriptionOracle, UserId};
use tokio::sync::Mutex;

/// One recorded call to [`BalanceOracle::deduct`].
#[derive(Debug, Clone, PartialEq)]
pub struct Deduction {
    pub user: UserId,
    pub amount: f64,
    pub description: String,
}

#[derive(Default)]
struct State {
    balances: HashMap<UserId, f64>,
    subscribers: HashSet<UserId>,
    deductions: Vec<Deduction>,
    fail_deductions: bool,
}

/// Ledger double with the same domain errors as the SQLite ledger.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, user: UserId, balance: f64) {
        self.state.lock().await.balances.insert(user, balance);
    }

    pub async fn set_subscribed(&self, user: UserId, active: bool) {
        let mut state = self.state.lock().await;
        if active {
            state.subscribers.insert(user);
        } else {
            state.subscribers.remove(&user);
        }
    }

    /// Makes every later `deduct` fail as if the ledger were unreachable.
    pub async fn fail_deductions(&self) {
        self.state.lock().await.fail_deductions = true;
    }

    /// Every successful deduction so far, in order.
    pub async fn deductions(&self) -> Vec<Deduction> {
        self.state.lock().await.deductions.clone()
    }
}

#[async_trait]
impl BalanceOracle for InMemoryLedger {
    async fn have(&self, user: UserId, amount: f64) -> Result<bool, ParleyError> {
        let state = self.state.lock().await;
        Ok(state.balances.get(&user).copied().unwrap_or(0.0) >= amount)
    }

    async fn deduct(
        &self,
        user: UserId,
        amount: f64,
        description: &str,
    ) -> Result<(), ParleyError> {
        let mut state = self.state.lock().await;
        if state.fail_deductions {
            return Err(ParleyError::Internal("ledger unavailable".into()));
        }
        let balance = state
            .balances
            .get_mut(&user)
            .ok_or(DomainError::UserNotFound)?;
        if *balance < amount {
            return Err(DomainError::InsufficientFunds.into());
        }
        *balance -= amount;
        state.deductions.push(Deduction {
            user,
            amount,
            description: description.to_string(),
        });
        Ok(())
    }

    async fn get_balance(&self, user: UserId) -> Result<f64, ParleyError> {
        Ok(self
            .state
            .lock()
            .await
            .balances
            .get(&user)
            .copied()
            .unwrap_or(0.0))
    }
}

#[async_trait]
impl SubscriptionOracle for InMemoryLedger {
    async fn is_active_subscription(&self, user: UserId) -> Result<bool, ParleyError> {
        Ok(self.state.lock().await.subscribers.contains(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deduct_records_and_debits() {
        let ledger = InMemoryLedger::new();
        ledger.set_balance(UserId(1), 5.0).await;
        ledger.deduct(UserId(1), 2.0, "chat").await.unwrap();
        assert_eq!(ledger.get_balance(UserId(1)).await.unwrap(), 3.0);
        assert_eq!(ledger.deductions().await.len(), 1);

        let err = ledger.deduct(UserId(1), 4.0, "chat").await.unwrap_err();
        assert_eq!(err.domain(), Some(DomainError::InsufficientFunds));
        let err = ledger.deduct(UserId(2), 1.0, "chat").await.unwrap_err();
        assert_eq!(err.domain(), Some(DomainError::UserNotFound));

        ledger.fail_deductions().await;
        let err = ledger.deduct(UserId(1), 1.0, "chat").await.unwrap_err();
        assert!(err.domain().is_none());
        assert_eq!(ledger.get_balance(UserId(1)).await.unwrap(), 3.0);
    }
}
