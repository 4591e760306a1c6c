// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared wiring of stores, ledger, gate and gateway for every subcommand.

use std::sync::Arc;

use parley_agent::{TurnHandler, TurnSettings, load_system_prompt};
use parley_billing::{AccessGate, PricingTable, SqliteLedger};
use parley_config::ParleyConfig;
use parley_core::{FileFetcher, KeyedStore, ParleyError};
use parley_gateway::HttpGateway;
use parley_session::{ConversationLimits, ConversationStore, KeySpace, open_store};
use tracing::info;

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

/// Opens the keyed store and wraps it with the configured bounds.
pub async fn open_conversations(config: &ParleyConfig) -> Result<ConversationStore, ParleyError> {
    let store: Arc<dyn KeyedStore> = open_store(&config.store).await?;
    info!(backend = store.name(), prefix = %config.store.key_prefix, "keyed store ready");
    Ok(ConversationStore::new(
        store,
        KeySpace::new(config.store.key_prefix.clone()),
        ConversationLimits::from(&config.memory),
    ))
}

pub async fn open_ledger(config: &ParleyConfig) -> Result<Arc<SqliteLedger>, ParleyError> {
    let ledger = SqliteLedger::open(&config.billing.database_path).await?;
    info!(path = %config.billing.database_path, "ledger opened");
    Ok(Arc::new(ledger))
}

/// Everything a subcommand needs to run turns.
pub struct Services {
    pub handler: TurnHandler,
    pub ledger: Arc<SqliteLedger>,
    pub gateway: Arc<HttpGateway>,
}

/// Builds the full turn pipeline.
pub async fn build_services(
    config: &ParleyConfig,
    files: Arc<dyn FileFetcher>,
) -> Result<Services, ParleyError> {
    let conversations = open_conversations(config).await?;
    let ledger = open_ledger(config).await?;
    let pricing = Arc::new(PricingTable::with_overrides(&config.billing.models));
    let gate = AccessGate::new(
        pricing,
        ledger.clone(),
        ledger.clone(),
        Arc::new(conversations.clone()),
        config.billing.daily_base_limit,
    );
    let gateway = Arc::new(HttpGateway::new(config)?);
    let system_prompt = load_system_prompt(
        &config.bot.name,
        &config.bot.system_prompt,
        &config.bot.system_prompt_file,
    )
    .await;

    let handler = TurnHandler::new(
        conversations,
        gate,
        gateway.clone(),
        files,
        TurnSettings::from_config(config, system_prompt),
    );
    Ok(Services {
        handler,
        ledger,
        gateway,
    })
}
