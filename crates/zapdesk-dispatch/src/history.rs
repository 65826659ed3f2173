// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Paged message history and read marking.

use std::sync::Arc;

use tracing::debug;

use zapdesk_bus::EventBus;
use zapdesk_config::model::HistoryConfig;
use zapdesk_core::types::{EntityKind, EventAction, Message, MessagePage, Ticket};
use zapdesk_core::{StorageAdapter, ZapdeskError};

pub struct MessageHistory {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    bus: Arc<EventBus>,
    page_size: u32,
}

impl MessageHistory {
    pub fn new(
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        bus: Arc<EventBus>,
        config: &HistoryConfig,
    ) -> Self {
        Self {
            storage,
            bus,
            page_size: config.page_size.max(1),
        }
    }

    /// One page of a ticket's messages, oldest first within the page.
    ///
    /// Page 1 holds the newest messages; `has_more` tells whether an older
    /// page exists.
    pub async fn page(
        &self,
        ticket_id: &str,
        tenant_id: i64,
        page_number: u32,
    ) -> Result<MessagePage, ZapdeskError> {
        match self.storage.get_ticket(ticket_id).await? {
            Some(ticket) if ticket.tenant_id == tenant_id => {}
            _ => {
                return Err(ZapdeskError::TicketNotFound {
                    ticket_id: ticket_id.to_string(),
                });
            }
        }

        let limit = i64::from(self.page_size);
        let offset = i64::from(page_number.max(1) - 1) * limit;
        let (mut messages, count) = self.storage.list_messages(ticket_id, limit, offset).await?;
        let has_more = count > offset + messages.len() as i64;
        messages.reverse();
        Ok(MessagePage {
            messages,
            count,
            has_more,
        })
    }

    /// Flips unread inbound messages to read. Publishes one message update
    /// per flipped row and a ticket update when anything changed.
    pub async fn mark_read(&self, ticket: &Ticket) -> Result<usize, ZapdeskError> {
        let flipped = self.storage.mark_messages_read(&ticket.id).await?;
        if flipped.is_empty() {
            return Ok(0);
        }
        for message in &flipped {
            self.bus.publish_record(
                ticket.tenant_id,
                EntityKind::Message,
                EventAction::Update,
                message,
            );
        }
        self.bus
            .publish_record(ticket.tenant_id, EntityKind::Ticket, EventAction::Update, ticket);
        debug!(ticket_id = %ticket.id, count = flipped.len(), "messages marked read");
        Ok(flipped.len())
    }

    /// A message of `ticket` that a reply may quote.
    pub async fn quotable(&self, ticket: &Ticket, message_id: &str) -> Result<Message, ZapdeskError> {
        match self.storage.get_message(message_id).await? {
            Some(message) if message.ticket_id == ticket.id => Ok(message),
            _ => Err(ZapdeskError::Validation(format!(
                "quoted message {message_id} is not part of ticket {}",
                ticket.id
            ))),
        }
    }
}
