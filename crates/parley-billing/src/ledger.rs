// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SP balance and subscription ledger backed by SQLite.
//!
//! All operations go through the single tokio-rusqlite background thread.
//! Every balance change writes a matching `transactions` row in the same
//! SQLite transaction, and a subscription is only inserted in the
//! transaction that charges for it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parley_core::{BalanceOracle, DomainError, ParleyError, SubscriptionOracle, UserId};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Tolerance when comparing REAL balances against prices.
const EPSILON: f64 = 1e-9;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY NOT NULL,
    balance REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY NOT NULL,
    user_ref INTEGER NOT NULL REFERENCES users(id),
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    auto_renew INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_ref, status);
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY NOT NULL,
    user_ref INTEGER NOT NULL REFERENCES users(id),
    amount REAL NOT NULL,
    description TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_ref, created_at);
";

/// A subscription record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: String,
    pub user: UserId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub auto_renew: bool,
    pub status: String,
}

/// One balance movement. Deductions are negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub amount: f64,
    pub description: String,
    pub created_at: String,
}

/// Failure raised inside a ledger closure.
#[derive(Debug, Error)]
enum LedgerFailure {
    #[error("{0}")]
    Domain(DomainError),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

impl From<DomainError> for LedgerFailure {
    fn from(err: DomainError) -> Self {
        LedgerFailure::Domain(err)
    }
}

/// Convert a tokio-rusqlite error into a `ParleyError`, keeping domain errors distinct.
fn map_tr_err(e: tokio_rusqlite::Error<LedgerFailure>) -> ParleyError {
    match e {
        tokio_rusqlite::Error::Error(LedgerFailure::Domain(d)) => ParleyError::Domain(d),
        tokio_rusqlite::Error::Error(LedgerFailure::Sql(e)) => ParleyError::store(e),
        tokio_rusqlite::Error::ConnectionClosed => {
            ParleyError::Internal("ledger connection closed".to_string())
        }
        _ => ParleyError::Internal("ledger connection failed".to_string()),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn record_transaction(
    conn: &rusqlite::Connection,
    user: i64,
    amount: f64,
    description: &str,
    now: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO transactions (id, user_ref, amount, description, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![uuid::Uuid::new_v4().to_string(), user, amount, description, now],
    )?;
    Ok(())
}

fn active_subscription_exists(
    conn: &rusqlite::Connection,
    user: i64,
    now: &str,
) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE user_ref = ?1 \
         AND status = 'active' AND period_start <= ?2 AND period_end > ?2)",
        params![user, now],
        |row| row.get(0),
    )
}

/// Debits `amount` or fails with the matching domain error.
fn debit(
    conn: &rusqlite::Connection,
    user: i64,
    amount: f64,
    description: &str,
    now: &str,
) -> Result<f64, LedgerFailure> {
    let balance: Option<f64> = conn
        .query_row(
            "SELECT balance FROM users WHERE id = ?1",
            params![user],
            |row| row.get(0),
        )
        .optional()?;
    let balance = balance.ok_or(DomainError::UserNotFound)?;
    if balance + EPSILON < amount {
        return Err(DomainError::InsufficientFunds.into());
    }
    let remaining = balance - amount;
    conn.execute(
        "UPDATE users SET balance = ?2 WHERE id = ?1",
        params![user, remaining],
    )?;
    record_transaction(conn, user, -amount, description, now)?;
    Ok(remaining)
}

/// Persistent SP ledger.
pub struct SqliteLedger {
    conn: tokio_rusqlite::Connection,
}

impl SqliteLedger {
    /// Wraps an open connection and creates the schema if missing.
    pub async fn new(conn: tokio_rusqlite::Connection) -> Result<Self, ParleyError> {
        conn.call(|conn| -> Result<(), LedgerFailure> {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        Ok(Self { conn })
    }

    /// Opens (or creates) the ledger database at `path`.
    pub async fn open(path: &str) -> Result<Self, ParleyError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(ParleyError::store)?;
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(ParleyError::store)?;
        Self::new(conn).await
    }

    /// An empty ledger in memory.
    pub async fn open_in_memory() -> Result<Self, ParleyError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(ParleyError::store)?;
        Self::new(conn).await
    }

    /// Adds SP to a user's balance, creating the user on first top-up.
    /// Returns the new balance.
    pub async fn credit(
        &self,
        user: UserId,
        amount: f64,
        description: &str,
    ) -> Result<f64, ParleyError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(ParleyError::Internal(format!(
                "credit amount must be positive, got {amount}"
            )));
        }
        let id = user.0;
        let description = description.to_string();
        let balance = self
            .conn
            .call(move |conn| -> Result<f64, LedgerFailure> {
                let now = timestamp(Utc::now());
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO users (id, balance, created_at) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(id) DO UPDATE SET balance = balance + excluded.balance",
                    params![id, amount, now],
                )?;
                record_transaction(&tx, id, amount, &description, &now)?;
                let balance: f64 =
                    tx.query_row("SELECT balance FROM users WHERE id = ?1", params![id], |row| {
                        row.get(0)
                    })?;
                tx.commit()?;
                Ok(balance)
            })
            .await
            .map_err(map_tr_err)?;

        info!(user_id = %user, amount, balance, "balance credited");
        Ok(balance)
    }

    /// Charges `price` and grants a subscription of `days`, atomically.
    ///
    /// Fails with `AlreadyHasActiveSubscription`, `UserNotFound` or
    /// `InsufficientFunds`; on failure nothing is charged or granted.
    pub async fn create_subscription(
        &self,
        user: UserId,
        price: f64,
        days: u32,
    ) -> Result<Subscription, ParleyError> {
        let id = user.0;
        let subscription = self
            .conn
            .call(move |conn| -> Result<Subscription, LedgerFailure> {
                let start = Utc::now();
                let end = start + Duration::days(i64::from(days));
                let now = timestamp(start);
                let tx = conn.transaction()?;
                if active_subscription_exists(&tx, id, &now)? {
                    return Err(DomainError::AlreadyHasActiveSubscription.into());
                }
                debit(&tx, id, price, &format!("subscription {days}d"), &now)?;
                let sub_id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO subscriptions (id, user_ref, period_start, period_end, auto_renew, status) \
                     VALUES (?1, ?2, ?3, ?4, 1, 'active')",
                    params![sub_id, id, now, timestamp(end)],
                )?;
                tx.commit()?;
                Ok(Subscription {
                    id: sub_id,
                    user: UserId(id),
                    period_start: start,
                    period_end: end,
                    auto_renew: true,
                    status: "active".to_string(),
                })
            })
            .await
            .map_err(map_tr_err)?;

        info!(user_id = %user, price, days, "subscription created");
        Ok(subscription)
    }

    /// Turns off auto-renewal of the active subscription.
    pub async fn cancel_auto_renew(&self, user: UserId) -> Result<(), ParleyError> {
        let id = user.0;
        self.conn
            .call(move |conn| -> Result<(), LedgerFailure> {
                let now = timestamp(Utc::now());
                let changed = conn.execute(
                    "UPDATE subscriptions SET auto_renew = 0 WHERE user_ref = ?1 \
                     AND status = 'active' AND period_start <= ?2 AND period_end > ?2",
                    params![id, now],
                )?;
                if changed == 0 {
                    return Err(DomainError::NoActiveSubscription.into());
                }
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        info!(user_id = %user, "subscription auto-renew cancelled");
        Ok(())
    }

    /// The subscription covering now, if any.
    pub async fn active_subscription(
        &self,
        user: UserId,
    ) -> Result<Option<Subscription>, ParleyError> {
        let id = user.0;
        self.conn
            .call(move |conn| -> Result<Option<Subscription>, LedgerFailure> {
                let now = timestamp(Utc::now());
                let row = conn
                    .query_row(
                        "SELECT id, period_start, period_end, auto_renew, status FROM subscriptions \
                         WHERE user_ref = ?1 AND status = 'active' AND period_start <= ?2 AND period_end > ?2 \
                         ORDER BY period_end DESC LIMIT 1",
                        params![id, now],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, bool>(3)?,
                                row.get::<_, String>(4)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row.map(|(sub_id, start, end, auto_renew, status)| Subscription {
                    id: sub_id,
                    user: UserId(id),
                    period_start: parse_timestamp(&start),
                    period_end: parse_timestamp(&end),
                    auto_renew,
                    status,
                }))
            })
            .await
            .map_err(map_tr_err)
    }

    /// Most recent balance movements, newest first.
    pub async fn recent_transactions(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>, ParleyError> {
        let id = user.0;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| -> Result<Vec<LedgerTransaction>, LedgerFailure> {
                let mut stmt = conn.prepare(
                    "SELECT id, amount, description, created_at FROM transactions \
                     WHERE user_ref = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![id, limit], |row| {
                        Ok(LedgerTransaction {
                            id: row.get(0)?,
                            amount: row.get(1)?,
                            description: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl BalanceOracle for SqliteLedger {
    async fn have(&self, user: UserId, amount: f64) -> Result<bool, ParleyError> {
        let balance = self.get_balance(user).await?;
        Ok(balance + EPSILON >= amount)
    }

    async fn deduct(
        &self,
        user: UserId,
        amount: f64,
        description: &str,
    ) -> Result<(), ParleyError> {
        let id = user.0;
        let desc = description.to_string();
        let remaining = self
            .conn
            .call(move |conn| -> Result<f64, LedgerFailure> {
                let now = timestamp(Utc::now());
                let tx = conn.transaction()?;
                let remaining = debit(&tx, id, amount, &desc, &now)?;
                tx.commit()?;
                Ok(remaining)
            })
            .await
            .map_err(map_tr_err)?;

        info!(user_id = %user, amount, remaining, description, "balance deducted");
        Ok(())
    }

    async fn get_balance(&self, user: UserId) -> Result<f64, ParleyError> {
        let id = user.0;
        self.conn
            .call(move |conn| -> Result<f64, LedgerFailure> {
                let balance: Option<f64> = conn
                    .query_row("SELECT balance FROM users WHERE id = ?1", params![id], |row| {
                        row.get(0)
                    })
                    .optional()?;
                Ok(balance.unwrap_or(0.0))
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl SubscriptionOracle for SqliteLedger {
    async fn is_active_subscription(&self, user: UserId) -> Result<bool, ParleyError> {
        let id = user.0;
        self.conn
            .call(move |conn| -> Result<bool, LedgerFailure> {
                let now = timestamp(Utc::now());
                Ok(active_subscription_exists(conn, id, &now)?)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn credit_creates_user_and_accumulates() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let user = UserId(1);
        assert_eq!(ledger.get_balance(user).await.unwrap(), 0.0);
        assert_eq!(ledger.credit(user, 10.0, "top-up").await.unwrap(), 10.0);
        assert_eq!(ledger.credit(user, 2.5, "top-up").await.unwrap(), 12.5);
        assert!(ledger.credit(user, -1.0, "bad").await.is_err());
    }

    #[tokio::test]
    async fn deduct_reports_domain_errors() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let err = ledger.deduct(UserId(2), 1.0, "x").await.unwrap_err();
        assert_eq!(err.domain(), Some(DomainError::UserNotFound));

        ledger.credit(UserId(2), 3.0, "top-up").await.unwrap();
        let err = ledger.deduct(UserId(2), 3.5, "x").await.unwrap_err();
        assert_eq!(err.domain(), Some(DomainError::InsufficientFunds));
        assert_eq!(ledger.get_balance(UserId(2)).await.unwrap(), 3.0);

        ledger.deduct(UserId(2), 3.0, "chat").await.unwrap();
        assert_eq!(ledger.get_balance(UserId(2)).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn have_compares_against_balance() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        ledger.credit(UserId(3), 5.0, "top-up").await.unwrap();
        assert!(ledger.have(UserId(3), 5.0).await.unwrap());
        assert!(!ledger.have(UserId(3), 5.001).await.unwrap());
        assert!(!ledger.have(UserId(4), 0.5).await.unwrap());
    }

    #[tokio::test]
    async fn subscription_charges_and_grants_together() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let user = UserId(5);
        ledger.credit(user, 100.0, "top-up").await.unwrap();

        let sub = ledger.create_subscription(user, 60.0, 30).await.unwrap();
        assert!(sub.auto_renew);
        assert_eq!((sub.period_end - sub.period_start).num_days(), 30);
        assert!(ledger.is_active_subscription(user).await.unwrap());
        assert_eq!(ledger.get_balance(user).await.unwrap(), 40.0);

        let err = ledger.create_subscription(user, 10.0, 30).await.unwrap_err();
        assert_eq!(err.domain(), Some(DomainError::AlreadyHasActiveSubscription));
        assert_eq!(ledger.get_balance(user).await.unwrap(), 40.0);
    }

    #[tokio::test]
    async fn failed_subscription_leaves_no_trace() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let user = UserId(6);
        ledger.credit(user, 10.0, "top-up").await.unwrap();

        let err = ledger.create_subscription(user, 60.0, 30).await.unwrap_err();
        assert_eq!(err.domain(), Some(DomainError::InsufficientFunds));
        assert!(!ledger.is_active_subscription(user).await.unwrap());
        assert_eq!(ledger.recent_transactions(user, 10).await.unwrap().len(), 1);

        let err = ledger
            .create_subscription(UserId(7), 1.0, 30)
            .await
            .unwrap_err();
        assert_eq!(err.domain(), Some(DomainError::UserNotFound));
    }

    #[tokio::test]
    async fn cancel_auto_renew_requires_active_subscription() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let user = UserId(8);
        let err = ledger.cancel_auto_renew(user).await.unwrap_err();
        assert_eq!(err.domain(), Some(DomainError::NoActiveSubscription));

        ledger.credit(user, 50.0, "top-up").await.unwrap();
        ledger.create_subscription(user, 20.0, 7).await.unwrap();
        ledger.cancel_auto_renew(user).await.unwrap();
        let sub = ledger.active_subscription(user).await.unwrap().unwrap();
        assert!(!sub.auto_renew);
    }

    #[tokio::test]
    async fn transactions_mirror_balance_changes() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let user = UserId(9);
        ledger.credit(user, 10.0, "top-up").await.unwrap();
        ledger.deduct(user, 4.0, "chat openai/gpt-4o").await.unwrap();
        let txs = ledger.recent_transactions(user, 10).await.unwrap();
        assert_eq!(txs.len(), 2);
        let sum: f64 = txs.iter().map(|t| t.amount).sum();
        assert!((sum - ledger.get_balance(user).await.unwrap()).abs() < 1e-9);
    }
}
