// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Zapdesk.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Zapdesk configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZapdeskConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Channel driver call limits.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Ticket lifecycle settings.
    #[serde(default)]
    pub tickets: TicketsConfig,

    /// Dispatch job queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Event bus settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Message history paging.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Every section and the keys it accepts, in file order.
///
/// Drives env var mapping and unknown-key diagnostics; a test keeps it in
/// step with the structs below.
pub const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("service", &["name", "log_level"]),
    ("storage", &["database_path", "wal_mode"]),
    ("channels", &["send_timeout_ms", "verify_timeout_ms"]),
    ("tickets", &["queueing_enabled", "auto_close_delay_ms"]),
    (
        "queue",
        &[
            "workers",
            "max_attempts",
            "poll_interval_ms",
            "lock_timeout_secs",
            "backoff",
            "backoff_base_ms",
            "backoff_max_ms",
        ],
    ),
    ("bus", &["capacity"]),
    ("history", &["page_size"]),
];

/// Keys accepted by `section`, or `None` for an unknown section.
pub fn section_keys(section: &str) -> Option<&'static [&'static str]> {
    KNOWN_KEYS
        .iter()
        .find(|(name, _)| *name == section)
        .map(|(_, keys)| *keys)
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name, used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "zapdesk".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("zapdesk").join("zapdesk.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("zapdesk.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Limits applied to every channel driver call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelsConfig {
    /// Upper bound on a single driver send, in milliseconds.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Upper bound on a number reachability check, in milliseconds.
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            verify_timeout_ms: default_verify_timeout_ms(),
        }
    }
}

fn default_send_timeout_ms() -> u64 {
    30_000
}

fn default_verify_timeout_ms() -> u64 {
    15_000
}

/// Ticket lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TicketsConfig {
    /// When true, new tickets start `pending` (waiting in a queue);
    /// otherwise they start `open`.
    #[serde(default = "default_queueing_enabled")]
    pub queueing_enabled: bool,

    /// Delay before a send-and-close ticket is closed, in milliseconds.
    #[serde(default = "default_auto_close_delay_ms")]
    pub auto_close_delay_ms: u64,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            queueing_enabled: default_queueing_enabled(),
            auto_close_delay_ms: default_auto_close_delay_ms(),
        }
    }
}

fn default_queueing_enabled() -> bool {
    true
}

fn default_auto_close_delay_ms() -> u64 {
    1_000
}

/// Retry delay growth between failed attempts of a dispatch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Every retry waits `backoff_base_ms`.
    Fixed,
    /// Retry `n` waits `backoff_base_ms * 2^(n-1)`, capped at `backoff_max_ms`.
    Exponential,
}

/// Dispatch job queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Number of concurrent job workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Attempts allowed per job before it is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How often idle workers poll for due jobs, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a dequeued job stays locked before it is considered stale.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    #[serde(default = "default_backoff")]
    pub backoff: BackoffKind,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_timeout_secs: default_lock_timeout_secs(),
            backoff: default_backoff(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_lock_timeout_secs() -> u64 {
    300
}

fn default_backoff() -> BackoffKind {
    BackoffKind::Exponential
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Per-tenant broadcast buffer. Lagging subscribers lose older events.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

fn default_bus_capacity() -> usize {
    256
}

/// Message history configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    20
}
