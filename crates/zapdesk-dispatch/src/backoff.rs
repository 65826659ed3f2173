// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry delays for failed dispatch jobs.

use std::time::Duration;

use zapdesk_config::model::{BackoffKind, QueueConfig};

/// Computes the wait before the next attempt of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    kind: BackoffKind,
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(kind: BackoffKind, base: Duration, max: Duration) -> Self {
        Self {
            kind,
            base,
            max: max.max(base),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.backoff,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.kind {
            BackoffKind::Fixed => self.base,
            BackoffKind::Exponential => {
                let pow = attempt.saturating_sub(1).min(16);
                let factor = 1u32 << pow;
                self.base.saturating_mul(factor).min(self.max)
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
