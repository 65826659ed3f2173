// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Number verification and canonicalization.

use tracing::debug;

use zapdesk_core::ZapdeskError;
use zapdesk_core::types::CanonicalAddress;

use crate::registry::ChannelSession;

/// Turns a user-typed number into the canonical address used as the
/// contact dedup key, after checking it exists on the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberValidator;

impl NumberValidator {
    pub fn new() -> Self {
        Self
    }

    /// Verifies `raw` through the channel and returns its digits-only form.
    ///
    /// Blank or digitless input is rejected without touching the network.
    /// Errors from the driver (including `NoChannelConnected` for a dead
    /// session) propagate unchanged.
    pub async fn validate(
        &self,
        raw: &str,
        session: &ChannelSession,
    ) -> Result<CanonicalAddress, ZapdeskError> {
        if raw.trim().is_empty() {
            return Err(ZapdeskError::Validation("number required".into()));
        }
        let Some(digits) = CanonicalAddress::normalize(raw) else {
            return Err(ZapdeskError::Validation(format!(
                "`{raw}` does not contain a phone number"
            )));
        };

        let verified = session.verify(digits.as_str()).await?;
        let Some(network_address) = verified else {
            debug!(channel_id = session.channel_id(), number = %digits, "number not on network");
            return Err(ZapdeskError::InvalidNumber {
                number: raw.to_string(),
            });
        };

        CanonicalAddress::normalize(&network_address).ok_or_else(|| ZapdeskError::InvalidNumber {
            number: raw.to_string(),
        })
    }
}
