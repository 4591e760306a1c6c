// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Brings up the keyed store, the ledger and the gateway, checks that each
//! is healthy, then runs the background sweep and memory monitor until
//! SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_agent::{SweepScheduler, drain_background, install_signal_handler};
use parley_config::ParleyConfig;
use parley_core::{FileFetcher, HealthStatus, ParleyError, PluginAdapter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app;

/// How long background jobs get to finish their current pass on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Placeholder fetcher until a chat front end supplies uploads.
struct NoFileSource;

#[async_trait]
impl FileFetcher for NoFileSource {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, ParleyError> {
        Err(ParleyError::Unsupported(format!(
            "no file source configured for {file_id}"
        )))
    }
}

/// Runs the daemon until a shutdown signal arrives.
pub async fn run_serve(config: ParleyConfig) -> Result<(), ParleyError> {
    app::init_tracing(&config.bot.log_level);
    info!(bot = %config.bot.name, "starting parley");

    let app::Services {
        handler, gateway, ..
    } = app::build_services(&config, Arc::new(NoFileSource)).await?;
    report_health(handler.conversations().backend().as_ref()).await;
    report_health(gateway.as_ref()).await;

    let cancel = install_signal_handler();

    let mut tasks = vec![("memory_monitor", tokio::spawn(memory_monitor(cancel.clone())))];

    if config.sweep.enabled {
        let scheduler = SweepScheduler::new(
            handler.conversations().clone(),
            Duration::from_secs(config.sweep.interval_secs),
        );
        info!(interval_secs = config.sweep.interval_secs, "sweep scheduler started");
        let sweep_cancel = cancel.clone();
        tasks.push((
            "sweep",
            tokio::spawn(async move {
                scheduler.run(sweep_cancel).await;
            }),
        ));
    } else {
        info!("sweep scheduler disabled by configuration");
    }

    cancel.cancelled().await;

    drain_background(tasks, SHUTDOWN_GRACE).await;
    if let Err(e) = handler.conversations().backend().shutdown().await {
        warn!(error = %e, "store shutdown failed");
    }

    info!("parley serve shutdown complete");
    Ok(())
}

async fn report_health(adapter: &dyn PluginAdapter) {
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => info!(adapter = adapter.name(), "adapter healthy"),
        Ok(status) => warn!(adapter = adapter.name(), status = ?status, "adapter not healthy"),
        Err(e) => warn!(adapter = adapter.name(), error = %e, "health check failed"),
    }
}

/// Logs heap usage every minute and warns above 512 MiB.
#[cfg(not(target_env = "msvc"))]
async fn memory_monitor(cancel: CancellationToken) {
    const WARN_BYTES: usize = 512 * 1024 * 1024;
    let mut interval = tokio::time::interval(Duration::from_secs(60));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let _ = tikv_jemalloc_ctl::epoch::advance();
                let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
                let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
                if allocated > WARN_BYTES {
                    warn!(
                        allocated_mb = allocated / (1024 * 1024),
                        resident_mb = resident / (1024 * 1024),
                        "memory pressure: heap above warning threshold"
                    );
                }
            }
            _ = cancel.cancelled() => {
                info!("memory monitor shutting down");
                break;
            }
        }
    }
}

#[cfg(target_env = "msvc")]
async fn memory_monitor(cancel: CancellationToken) {
    cancel.cancelled().await;
}
