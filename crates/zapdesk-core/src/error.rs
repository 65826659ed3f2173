// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Zapdesk.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Zapdesk crates.
#[derive(Debug, Error)]
pub enum ZapdeskError {
    /// No usable (connected) channel exists for the tenant or user.
    #[error("no connected channel for tenant {tenant_id}")]
    NoChannelConnected { tenant_id: i64 },

    /// The number is not reachable on the external network.
    #[error("number `{number}` is not reachable on the network")]
    InvalidNumber { number: String },

    /// Ticket id is stale or belongs to another tenant.
    #[error("ticket not found: {ticket_id}")]
    TicketNotFound { ticket_id: String },

    /// Contact id is stale or belongs to another tenant.
    #[error("contact not found: {contact_id}")]
    ContactNotFound { contact_id: String },

    /// Transport-level send failure reported by a channel driver.
    #[error("send failed on channel {channel_id}: {message}")]
    ChannelSend {
        channel_id: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A dispatch job failed on every allowed attempt.
    #[error("job {job_id} exhausted after {attempts} attempts")]
    JobExhausted { job_id: i64, attempts: u32 },

    /// Request rejected before any mutation (missing body, number, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// A concurrent writer changed the record first.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage backend errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// An external operation did not complete in time.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZapdeskError {
    /// Builds a [`ZapdeskError::ChannelSend`] without an underlying source.
    pub fn send_failed(channel_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ChannelSend {
            channel_id: channel_id.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Short machine-readable code, used in event payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoChannelConnected { .. } => "ERR_NO_CHANNEL_CONNECTED",
            Self::InvalidNumber { .. } => "ERR_INVALID_NUMBER",
            Self::TicketNotFound { .. } => "ERR_TICKET_NOT_FOUND",
            Self::ContactNotFound { .. } => "ERR_CONTACT_NOT_FOUND",
            Self::ChannelSend { .. } => "ERR_CHANNEL_SEND",
            Self::JobExhausted { .. } => "ERR_JOB_EXHAUSTED",
            Self::Validation(_) => "ERR_VALIDATION",
            Self::Conflict(_) => "ERR_CONFLICT",
            Self::Storage { .. } => "ERR_STORAGE",
            Self::Config(_) => "ERR_CONFIG",
            Self::Timeout { .. } => "ERR_TIMEOUT",
            Self::Internal(_) => "ERR_INTERNAL",
        }
    }
}
