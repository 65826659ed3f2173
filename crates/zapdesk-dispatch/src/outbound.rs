// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording of delivered outbound messages.
//!
//! Synchronous text sends and successful media jobs both end here, so a
//! delivered message always produces the same record, ticket update, and
//! event regardless of which path sent it.

use std::sync::Arc;

use tracing::{debug, warn};

use zapdesk_bus::EventBus;
use zapdesk_core::types::{
    EntityKind, EventAction, MediaRef, Message, SendAck, Ticket, TicketPatch, new_id,
    now_timestamp,
};
use zapdesk_core::{StorageAdapter, ZapdeskError};

use crate::tickets::TicketLifecycleManager;

pub struct OutboundRecorder {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    bus: Arc<EventBus>,
    tickets: Arc<TicketLifecycleManager>,
}

impl OutboundRecorder {
    pub fn new(
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        bus: Arc<EventBus>,
        tickets: Arc<TicketLifecycleManager>,
    ) -> Self {
        Self {
            storage,
            bus,
            tickets,
        }
    }

    /// Persists a message the channel accepted and refreshes the ticket's
    /// `last_message`.
    ///
    /// The message row is authoritative: if the ticket refresh fails it is
    /// logged and the message is still returned.
    pub async fn record(
        &self,
        ticket: &Ticket,
        body: &str,
        ack: &SendAck,
        media: Option<&MediaRef>,
        quoted_message_id: Option<&str>,
    ) -> Result<Message, ZapdeskError> {
        let message = Message {
            id: new_id(),
            tenant_id: ticket.tenant_id,
            ticket_id: ticket.id.clone(),
            contact_id: ticket.contact_id.clone(),
            body: body.to_string(),
            from_me: true,
            read: true,
            external_id: Some(ack.external_id.clone()),
            quoted_message_id: quoted_message_id.map(str::to_string),
            media_path: media.map(|m| m.path.clone()),
            media_name: media.map(|m| m.file_name.clone()),
            created_at: now_timestamp(),
        };
        self.storage.insert_message(&message).await?;
        debug!(ticket_id = %ticket.id, message_id = %message.id, "outbound message recorded");
        self.bus.publish_record(
            ticket.tenant_id,
            EntityKind::Message,
            EventAction::Create,
            &message,
        );

        if let Err(e) = self
            .tickets
            .update(&ticket.id, &TicketPatch::last_message(body), ticket.tenant_id)
            .await
        {
            warn!(ticket_id = %ticket.id, error = %e, "could not refresh ticket last message");
        }
        Ok(message)
    }
}
