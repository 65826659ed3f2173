// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints that serde attributes cannot express:
//! non-empty paths, positive limits, and coherent backoff bounds.

use crate::diagnostic::ConfigError;
use crate::model::ZapdeskConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ZapdeskConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of: {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.channels.send_timeout_ms == 0 {
        fail("channels.send_timeout_ms must be greater than 0".to_string());
    }
    if config.channels.verify_timeout_ms == 0 {
        fail("channels.verify_timeout_ms must be greater than 0".to_string());
    }

    if config.queue.workers == 0 {
        fail("queue.workers must be at least 1".to_string());
    }
    if config.queue.max_attempts == 0 {
        fail("queue.max_attempts must be at least 1".to_string());
    }
    if config.queue.poll_interval_ms == 0 {
        fail("queue.poll_interval_ms must be greater than 0".to_string());
    }
    if config.queue.lock_timeout_secs == 0 {
        fail("queue.lock_timeout_secs must be greater than 0".to_string());
    }
    if config.queue.backoff_max_ms < config.queue.backoff_base_ms {
        fail(format!(
            "queue.backoff_max_ms ({}) must not be below queue.backoff_base_ms ({})",
            config.queue.backoff_max_ms, config.queue.backoff_base_ms
        ));
    }

    if config.bus.capacity == 0 {
        fail("bus.capacity must be at least 1".to_string());
    }

    if config.history.page_size == 0 {
        fail("history.page_size must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
