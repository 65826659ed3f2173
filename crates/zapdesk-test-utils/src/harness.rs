// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete dispatch stack with a mock driver
//! on a temp SQLite database. Queue timings are shrunk so retry scenarios
//! settle in milliseconds.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use zapdesk_config::ZapdeskConfig;
use zapdesk_config::model::{BackoffKind, StorageConfig};
use zapdesk_core::types::{Channel, TenantContext};
use zapdesk_core::{StorageAdapter, ZapdeskError};
use zapdesk_dispatch::{DispatchService, WorkerPool};
use zapdesk_storage::SqliteStorage;

use crate::mock_channel::MockDriver;
use crate::storage::channel;

/// Tenant every harness channel belongs to.
pub const TENANT: i64 = 1;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: ZapdeskConfig,
    channels: Vec<Channel>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ZapdeskConfig::default();
        config.queue.workers = 2;
        config.queue.poll_interval_ms = 10;
        config.queue.backoff = BackoffKind::Fixed;
        config.queue.backoff_base_ms = 5;
        config.queue.backoff_max_ms = 5;
        config.tickets.auto_close_delay_ms = 50;
        Self {
            config,
            channels: vec![channel("main", TENANT, true)],
        }
    }

    /// New tickets start `open` instead of `pending`.
    pub fn without_queueing(mut self) -> Self {
        self.config.tickets.queueing_enabled = false;
        self
    }

    pub fn with_auto_close_delay(mut self, delay: Duration) -> Self {
        self.config.tickets.auto_close_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.queue.max_attempts = attempts;
        self
    }

    /// Adds another connected channel, served by its own mock driver.
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }

    /// Start with no channels at all.
    pub fn without_channels(mut self) -> Self {
        self.channels.clear();
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ZapdeskError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ZapdeskError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter + Send + Sync> = Arc::new(storage);

        let service = DispatchService::new(&config, Arc::clone(&storage));
        let driver = Arc::new(MockDriver::new());
        for ch in &self.channels {
            storage.upsert_channel(ch).await?;
            service.registry.register(&ch.id, driver.clone());
        }

        Ok(TestHarness {
            service,
            driver,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a mock driver and temp storage.
///
/// Every channel shares the same [`MockDriver`], so assertions on sends
/// see all traffic.
pub struct TestHarness {
    pub service: DispatchService,
    pub driver: Arc<MockDriver>,
    pub config: ZapdeskConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default options.
    pub async fn new() -> Result<Self, ZapdeskError> {
        Self::builder().build().await
    }

    pub fn ctx(&self) -> TenantContext {
        TenantContext::new(TENANT)
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter + Send + Sync> {
        &self.service.storage
    }

    /// Starts the dispatch workers. Call `shutdown` on the pool when done.
    pub async fn start_workers(&self) -> Result<WorkerPool, ZapdeskError> {
        self.service.start(CancellationToken::new()).await
    }

    /// Waits until every queued job has been delivered or dropped.
    pub async fn settle(&self) -> Result<(), ZapdeskError> {
        self.service.queue.wait_idle(Duration::from_secs(5)).await
    }
}
