// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapdesk serve` command implementation.
//!
//! Opens storage, returns jobs a previous process left locked to the queue,
//! and runs the dispatch workers until a shutdown signal arrives. Channel
//! drivers attach to the registry from the host side; until one does, jobs
//! fail with `NoChannelConnected` and are retried.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use zapdesk_config::model::ZapdeskConfig;
use zapdesk_core::types::HealthStatus;
use zapdesk_core::{StorageAdapter, ZapdeskError};
use zapdesk_dispatch::{ChannelRegistry, DispatchService, shutdown};
use zapdesk_storage::SqliteStorage;

/// Runs the `zapdesk serve` command.
///
/// Bus traffic of `watch_tenants` is logged at debug level.
pub async fn run_serve(config: ZapdeskConfig, watch_tenants: Vec<i64>) -> Result<(), ZapdeskError> {
    init_tracing(&config.service.log_level);

    info!(name = %config.service.name, "starting zapdesk serve");

    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let storage: Arc<dyn StorageAdapter + Send + Sync> = Arc::new(storage);

    let service = DispatchService::new(&config, Arc::clone(&storage));

    let cancel = shutdown::install_signal_handler();

    for tenant_id in watch_tenants {
        let bus = Arc::clone(&service.bus);
        let cancel = cancel.clone();
        tokio::spawn(async move { log_bus_traffic(&bus, tenant_id, cancel).await });
    }

    {
        let mem_cancel = cancel.clone();
        tokio::spawn(async move { memory_monitor(mem_cancel).await });
    }

    {
        let registry = Arc::clone(&service.registry);
        let health_cancel = cancel.clone();
        tokio::spawn(async move { health_monitor(&registry, health_cancel).await });
    }

    let pool = service.start(cancel.clone()).await?;
    info!(workers = pool.len(), "zapdesk serve ready");

    cancel.cancelled().await;
    info!("shutdown requested, draining dispatch workers");

    pool.shutdown().await;
    service.shutdown().await;
    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage did not close cleanly");
    }

    info!("zapdesk serve shutdown complete");
    Ok(())
}

/// Logs every event published to one tenant until cancelled.
async fn log_bus_traffic(bus: &zapdesk_bus::EventBus, tenant_id: i64, cancel: CancellationToken) {
    use tokio::sync::broadcast::error::RecvError;

    let mut rx = bus.subscribe(tenant_id);
    debug!(tenant_id, "watching event bus");
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => debug!(
                    tenant_id,
                    kind = %event.entity_kind,
                    action = %event.action,
                    event_id = %event.id,
                    "bus event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(tenant_id, skipped, "bus watcher lagged, events skipped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = cancel.cancelled() => break,
        }
    }
}

/// Checks registered channel drivers once a minute and warns about any
/// that are not healthy.
async fn health_monitor(registry: &ChannelRegistry, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = registry.health().await;
                debug!(channels = report.len(), "channel health checked");
                for (channel_id, status) in report {
                    match status {
                        HealthStatus::Healthy => {}
                        HealthStatus::Degraded(reason) => {
                            warn!(%channel_id, %reason, "channel degraded");
                        }
                        HealthStatus::Unhealthy(reason) => {
                            warn!(%channel_id, %reason, "channel unhealthy");
                        }
                    }
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// Logs heap usage reported by jemalloc once a minute.
#[cfg(not(target_env = "msvc"))]
async fn memory_monitor(cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let _ = tikv_jemalloc_ctl::epoch::advance();
                let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
                let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
                debug!(
                    allocated_kb = allocated / 1024,
                    resident_kb = resident / 1024,
                    "memory usage"
                );
            }
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(target_env = "msvc")]
async fn memory_monitor(cancel: CancellationToken) {
    cancel.cancelled().await;
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zapdesk={log_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
