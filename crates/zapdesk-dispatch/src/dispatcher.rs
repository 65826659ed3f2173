// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message dispatch.
//!
//! Text is sent synchronously and recorded only after the channel accepts
//! it. Media is never sent inline: every attachment becomes its own durable
//! job, so one failing file cannot hold back or roll back the others.
//!
//! Requests are validated before any lookup that could write, so a
//! rejected request leaves no contact, ticket, or message behind.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use zapdesk_core::types::{
    CanonicalAddress, Contact, DispatchJob, DispatchPayload, JobHandle, MediaRef, Message, MessageRequest,
    TenantContext, Ticket,
};
use zapdesk_core::ZapdeskError;

use crate::contacts::{ContactDetails, ContactResolver};
use crate::history::MessageHistory;
use crate::outbound::OutboundRecorder;
use crate::queue::JobQueue;
use crate::registry::ChannelRegistry;
use crate::template::TemplateRenderer;
use crate::tickets::TicketLifecycleManager;
use crate::validator::NumberValidator;

/// What happened to a dispatched request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DispatchOutcome {
    /// Text delivered and recorded.
    Sent { message: Message },
    /// One job per attachment, delivered in the background.
    Queued { jobs: Vec<JobHandle> },
}

/// A send to a phone number rather than an existing ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendToNumber {
    /// Channel to send through; resolved for the tenant/user when absent.
    pub channel_id: Option<String>,
    pub number: String,
    pub request: MessageRequest,
    /// Close the ticket shortly after sending.
    pub close_ticket: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub contact: Contact,
    pub ticket: Ticket,
    pub outcome: DispatchOutcome,
}

pub struct MessageDispatcher {
    registry: Arc<ChannelRegistry>,
    validator: NumberValidator,
    contacts: Arc<ContactResolver>,
    tickets: Arc<TicketLifecycleManager>,
    history: Arc<MessageHistory>,
    queue: Arc<JobQueue>,
    recorder: Arc<OutboundRecorder>,
    renderer: TemplateRenderer,
    max_attempts: u32,
    auto_close_delay: Duration,
}

/// Shared components the dispatcher routes through.
pub struct DispatcherParts {
    pub registry: Arc<ChannelRegistry>,
    pub contacts: Arc<ContactResolver>,
    pub tickets: Arc<TicketLifecycleManager>,
    pub history: Arc<MessageHistory>,
    pub queue: Arc<JobQueue>,
    pub recorder: Arc<OutboundRecorder>,
}

impl MessageDispatcher {
    pub fn new(parts: DispatcherParts, max_attempts: u32, auto_close_delay: Duration) -> Self {
        Self {
            registry: parts.registry,
            validator: NumberValidator::new(),
            contacts: parts.contacts,
            tickets: parts.tickets,
            history: parts.history,
            queue: parts.queue,
            recorder: parts.recorder,
            renderer: TemplateRenderer::new(),
            max_attempts: max_attempts.max(1),
            auto_close_delay,
        }
    }

    /// Sends a text on `ticket` and records it.
    ///
    /// Nothing is recorded when the channel rejects the message.
    pub async fn send_text(
        &self,
        ctx: &TenantContext,
        ticket: &Ticket,
        body: &str,
        quoted_id: Option<&str>,
    ) -> Result<Message, ZapdeskError> {
        if body.trim().is_empty() {
            return Err(ZapdeskError::Validation("a message body is required".into()));
        }
        let contact = self.ticket_contact(ctx, ticket).await?;
        let quoted = match quoted_id {
            Some(id) => Some(self.history.quotable(ticket, id).await?),
            None => None,
        };
        self.send_text_to(ctx, ticket, &contact, body, quoted.as_ref())
            .await
    }

    /// Sends text with an already resolved quote. Nothing may fail
    /// validation past this point.
    async fn send_text_to(
        &self,
        ctx: &TenantContext,
        ticket: &Ticket,
        contact: &Contact,
        body: &str,
        quoted: Option<&Message>,
    ) -> Result<Message, ZapdeskError> {
        let (channel, session) = self.registry.session_for(ctx, &ticket.channel_id).await?;
        let rendered = self.renderer.render(body, contact, Some(&ticket.id));

        let ack = session
            .send(
                &contact.address,
                &rendered,
                None,
                quoted.and_then(|q| q.external_id.as_deref()),
            )
            .await?;
        debug!(ticket_id = %ticket.id, channel_id = %channel.id, "text delivered");

        self.recorder
            .record(
                ticket,
                &rendered,
                &ack,
                None,
                quoted.map(|q| q.id.as_str()),
            )
            .await
    }

    /// Enqueues one dispatch job per attachment and returns their handles.
    ///
    /// Each job's body is the attachment's caption, else the shared body,
    /// else the file name.
    pub async fn send_media(
        &self,
        ctx: &TenantContext,
        ticket: &Ticket,
        attachments: &[MediaRef],
        body: Option<&str>,
    ) -> Result<Vec<JobHandle>, ZapdeskError> {
        MessageRequest::Media {
            attachments: attachments.to_vec(),
            body: body.map(str::to_string),
        }
        .validate()?;
        let contact = self.ticket_contact(ctx, ticket).await?;
        self.enqueue_media(ticket, &contact, attachments, body).await
    }

    async fn enqueue_media(
        &self,
        ticket: &Ticket,
        contact: &Contact,
        attachments: &[MediaRef],
        body: Option<&str>,
    ) -> Result<Vec<JobHandle>, ZapdeskError> {
        let mut handles = Vec::with_capacity(attachments.len());
        for media in attachments {
            let non_blank = |b: &&str| !b.trim().is_empty();
            let text = media
                .caption
                .as_deref()
                .filter(non_blank)
                .or(body.filter(non_blank));
            let rendered = match text {
                Some(text) => self.renderer.render(text, contact, Some(&ticket.id)),
                None => media.file_name.clone(),
            };
            let job = DispatchJob {
                channel_id: ticket.channel_id.clone(),
                tenant_id: ticket.tenant_id,
                ticket_id: ticket.id.clone(),
                attempts_max: self.max_attempts,
                remove_on_complete: true,
                data: DispatchPayload {
                    address: contact.address.clone(),
                    body: rendered,
                    media_path: Some(media.path.clone()),
                    file_name: Some(media.file_name.clone()),
                    mime_type: media.mime_type.clone(),
                },
            };
            handles.push(self.queue.enqueue(&job).await?);
        }
        info!(ticket_id = %ticket.id, jobs = handles.len(), "media dispatch queued");
        Ok(handles)
    }

    /// Sends a validated request on an existing ticket.
    pub async fn dispatch(
        &self,
        ctx: &TenantContext,
        ticket: &Ticket,
        request: &MessageRequest,
    ) -> Result<DispatchOutcome, ZapdeskError> {
        request.validate()?;
        let contact = self.ticket_contact(ctx, ticket).await?;
        let quoted = self.resolve_quote(ticket, request).await?;
        self.dispatch_to(ctx, ticket, &contact, request, quoted.as_ref())
            .await
    }

    /// The message a text request quotes, checked against `ticket`.
    async fn resolve_quote(
        &self,
        ticket: &Ticket,
        request: &MessageRequest,
    ) -> Result<Option<Message>, ZapdeskError> {
        match request {
            MessageRequest::Text {
                quoted_id: Some(id),
                ..
            } => self.history.quotable(ticket, id).await.map(Some),
            _ => Ok(None),
        }
    }

    async fn dispatch_to(
        &self,
        ctx: &TenantContext,
        ticket: &Ticket,
        contact: &Contact,
        request: &MessageRequest,
        quoted: Option<&Message>,
    ) -> Result<DispatchOutcome, ZapdeskError> {
        match request {
            MessageRequest::Text { body, .. } => {
                let message = self
                    .send_text_to(ctx, ticket, contact, body, quoted)
                    .await?;
                Ok(DispatchOutcome::Sent { message })
            }
            MessageRequest::Media { attachments, body } => {
                let jobs = self
                    .enqueue_media(ticket, contact, attachments, body.as_deref())
                    .await?;
                Ok(DispatchOutcome::Queued { jobs })
            }
        }
    }

    /// Replies on an existing ticket, marking its inbound messages read first.
    pub async fn reply(
        &self,
        ctx: &TenantContext,
        ticket_id: &str,
        request: &MessageRequest,
    ) -> Result<DispatchOutcome, ZapdeskError> {
        request.validate()?;
        let ticket = self.tickets.show(ticket_id, ctx.tenant_id).await?;
        let contact = self.ticket_contact(ctx, &ticket).await?;
        let quoted = self.resolve_quote(&ticket, request).await?;
        self.history.mark_read(&ticket).await?;
        self.dispatch_to(ctx, &ticket, &contact, request, quoted.as_ref())
            .await
    }

    /// Sends to a phone number: verifies it, resolves the contact and its
    /// active ticket, then dispatches.
    pub async fn send_to_number(
        &self,
        ctx: &TenantContext,
        req: &SendToNumber,
    ) -> Result<SendReceipt, ZapdeskError> {
        req.request.validate()?;
        if req.number.trim().is_empty() {
            return Err(ZapdeskError::Validation("number required".into()));
        }

        let (channel, session) = match req.channel_id.as_deref() {
            Some(channel_id) => self.registry.channel_session(ctx, channel_id).await?,
            None => self.registry.resolve_session(ctx).await?,
        };
        let address = self.validator.validate(&req.number, &session).await?;
        let quoted = self
            .quote_for_number(ctx, &address, &channel.id, &req.request)
            .await?;

        let profile_pic_url = match session.profile_pic_url(address.as_str()).await {
            Ok(url) => url,
            Err(e) => {
                warn!(channel_id = %channel.id, address = %address, error = %e, "profile picture lookup failed");
                None
            }
        };
        let contact = self
            .contacts
            .resolve_or_create(
                ctx.tenant_id,
                &address,
                &ContactDetails {
                    name: None,
                    profile_pic_url,
                    is_group: false,
                },
            )
            .await?;
        let ticket = self
            .tickets
            .find_or_create(&contact, &channel.id, None, ctx.tenant_id)
            .await?;

        let outcome = self
            .dispatch_to(ctx, &ticket, &contact, &req.request, quoted.as_ref())
            .await?;

        let ticket = self.tickets.show(&ticket.id, ctx.tenant_id).await?;
        if req.close_ticket && self.tickets.schedule_auto_close(&ticket, self.auto_close_delay) {
            debug!(ticket_id = %ticket.id, "ticket will close after send");
        }
        self.history.mark_read(&ticket).await?;

        Ok(SendReceipt {
            contact,
            ticket,
            outcome,
        })
    }

    /// Resolves a quote for a send to a number before anything is written.
    ///
    /// A quote can only point into the contact's current active ticket, so
    /// the contact and that ticket must already exist.
    async fn quote_for_number(
        &self,
        ctx: &TenantContext,
        address: &CanonicalAddress,
        channel_id: &str,
        request: &MessageRequest,
    ) -> Result<Option<Message>, ZapdeskError> {
        let MessageRequest::Text {
            quoted_id: Some(quoted_id),
            ..
        } = request
        else {
            return Ok(None);
        };
        let Some(contact) = self.contacts.find(ctx.tenant_id, address).await? else {
            return Err(ZapdeskError::Validation(format!(
                "quoted message {quoted_id} has no conversation with {address}"
            )));
        };
        let Some(ticket) = self.tickets.find_active(&contact, channel_id).await? else {
            return Err(ZapdeskError::Validation(format!(
                "quoted message {quoted_id} has no open ticket on channel {channel_id}"
            )));
        };
        self.history.quotable(&ticket, quoted_id).await.map(Some)
    }

    async fn ticket_contact(
        &self,
        ctx: &TenantContext,
        ticket: &Ticket,
    ) -> Result<Contact, ZapdeskError> {
        if ticket.tenant_id != ctx.tenant_id {
            return Err(ZapdeskError::TicketNotFound {
                ticket_id: ticket.id.clone(),
            });
        }
        self.contacts.get(ctx.tenant_id, &ticket.contact_id).await
    }
}
