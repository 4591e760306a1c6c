// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot administration commands: `sweep`, `credit`, `subscribe`.

use colored::Colorize;
use parley_billing::{SqliteLedger, Subscription};
use parley_config::ParleyConfig;
use parley_core::{DomainError, ParleyError, UserId};
use parley_session::SweepReport;

use crate::app;

/// Runs one aged-entry sweep and prints the report.
pub async fn run_sweep(config: &ParleyConfig) -> Result<(), ParleyError> {
    app::init_tracing(&config.bot.log_level);
    let conversations = app::open_conversations(config).await?;
    let report = conversations.sweep_aged().await?;
    println!("{}", format_report(&report));
    Ok(())
}

/// Tops up a user's balance.
pub async fn run_credit(config: &ParleyConfig, user: UserId, amount: f64) -> Result<(), ParleyError> {
    app::init_tracing(&config.bot.log_level);
    let ledger = app::open_ledger(config).await?;
    let balance = ledger.credit(user, amount, "manual top-up").await?;
    println!(
        "{} credited {amount:.2} SP to user {user}, balance now {balance:.2} SP",
        "ok".green()
    );
    Ok(())
}

/// Buys a subscription for the configured price and period.
///
/// Domain refusals are printed rather than returned, so the exit code stays
/// zero when the ledger simply said no.
pub async fn run_subscribe(config: &ParleyConfig, user: UserId) -> Result<(), ParleyError> {
    app::init_tracing(&config.bot.log_level);
    let ledger = app::open_ledger(config).await?;
    match subscribe(&ledger, config, user).await {
        Ok(sub) => {
            println!(
                "{} subscription {} active until {}",
                "ok".green(),
                sub.id,
                sub.period_end.format("%Y-%m-%d %H:%M UTC")
            );
            Ok(())
        }
        Err(ParleyError::Domain(reason)) => {
            eprintln!("{}", refusal_message(reason).yellow());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn subscribe(
    ledger: &SqliteLedger,
    config: &ParleyConfig,
    user: UserId,
) -> Result<Subscription, ParleyError> {
    ledger
        .create_subscription(
            user,
            config.billing.subscription_price,
            config.billing.subscription_days,
        )
        .await
}

fn refusal_message(reason: DomainError) -> &'static str {
    match reason {
        DomainError::AlreadyHasActiveSubscription => "user already has an active subscription",
        DomainError::InsufficientFunds => "insufficient balance for a subscription",
        DomainError::UserNotFound => "user has no balance record yet, credit them first",
        DomainError::NoActiveSubscription => "user has no active subscription",
    }
}

fn format_report(report: &SweepReport) -> String {
    format!(
        "sweep: scanned {}, rewritten {}, deleted {}, failed {}",
        report.scanned, report.rewritten, report.deleted, report.failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_ledger(dir: &tempfile::TempDir) -> ParleyConfig {
        let mut config = ParleyConfig::default();
        config.billing.database_path = dir.path().join("ledger.db").display().to_string();
        config.billing.subscription_price = 100.0;
        config
    }

    #[test]
    fn report_lists_every_count() {
        let report = SweepReport {
            scanned: 4,
            rewritten: 2,
            deleted: 1,
            failed: 0,
        };
        assert_eq!(
            format_report(&report),
            "sweep: scanned 4, rewritten 2, deleted 1, failed 0"
        );
    }

    #[tokio::test]
    async fn subscribe_charges_configured_price() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_ledger(&dir);
        let ledger = app::open_ledger(&config).await.unwrap();
        ledger.credit(UserId(7), 150.0, "seed").await.unwrap();

        let sub = subscribe(&ledger, &config, UserId(7)).await.unwrap();
        assert!(sub.auto_renew);
        assert!(sub.period_end > sub.period_start);

        let again = subscribe(&ledger, &config, UserId(7)).await.unwrap_err();
        assert!(matches!(
            again,
            ParleyError::Domain(DomainError::AlreadyHasActiveSubscription)
        ));
    }

    #[tokio::test]
    async fn subscribe_without_funds_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_ledger(&dir);
        let ledger = app::open_ledger(&config).await.unwrap();
        ledger.credit(UserId(8), 10.0, "seed").await.unwrap();

        let err = subscribe(&ledger, &config, UserId(8)).await.unwrap_err();
        let ParleyError::Domain(reason) = err else {
            panic!("expected a domain refusal, got {err:?}");
        };
        assert_eq!(refusal_message(reason), "insufficient balance for a subscription");
    }

    #[tokio::test]
    async fn sweep_on_empty_store_reports_nothing() {
        let config = ParleyConfig::default();
        let conversations = app::open_conversations(&config).await.unwrap();
        let report = conversations.sweep_aged().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
