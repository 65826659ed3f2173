// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel driver trait for the external messaging session (WhatsApp-like).

use async_trait::async_trait;

use crate::error::ZapdeskError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MediaRef, PhonebookEntry, SendAck};

/// Opaque client for one external messaging session.
///
/// Drivers are not required to be safe for interleaved sends; callers go
/// through `ChannelSession`, which holds one send in flight per channel.
/// Connectivity is reported by the driver writing the channel's status in
/// storage, not through this trait.
#[async_trait]
pub trait ChannelDriver: PluginAdapter {
    /// Checks that `raw` is reachable on the network.
    ///
    /// Returns the network's address for the number (e.g. a JID), or `None`
    /// when the number does not exist.
    async fn verify_number(&self, raw: &str) -> Result<Option<String>, ZapdeskError>;

    /// Sends `body` (and optionally one media file) to a canonical address.
    ///
    /// `quoted_external_id` is the network id of the message being replied to.
    async fn send(
        &self,
        address: &str,
        body: &str,
        media: Option<&MediaRef>,
        quoted_external_id: Option<&str>,
    ) -> Result<SendAck, ZapdeskError>;

    /// Profile picture URL for an address, if the network exposes one.
    async fn profile_pic_url(&self, address: &str) -> Result<Option<String>, ZapdeskError>;

    /// The session's phonebook, used by contact import.
    async fn fetch_contacts(&self) -> Result<Vec<PhonebookEntry>, ZapdeskError>;
}
