// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait: the persistence collaborator for the core.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ZapdeskError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Channel, ChannelStatus, Contact, ContactFilter, ContactWrite, JobFailure, Message, NewContact,
    NewTicket, QueueEntry, Ticket, TicketGuard, TicketStatus,
};

/// Persistence for channels, contacts, tickets, messages and dispatch jobs.
///
/// Writes that guard an invariant (contact uniqueness, the single active
/// ticket per contact/channel, optimistic ticket updates) are expressed as
/// single operations so the backend can make them atomic.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connections, etc.).
    async fn initialize(&self) -> Result<(), ZapdeskError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ZapdeskError>;

    // --- Channels (written by drivers/admin, read by the core) ---

    async fn upsert_channel(&self, channel: &Channel) -> Result<(), ZapdeskError>;

    async fn set_channel_status(
        &self,
        channel_id: &str,
        status: ChannelStatus,
    ) -> Result<(), ZapdeskError>;

    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>, ZapdeskError>;

    /// All channels of a tenant, default channel first.
    async fn list_channels(&self, tenant_id: i64) -> Result<Vec<Channel>, ZapdeskError>;

    async fn assign_user_channel(
        &self,
        user_id: i64,
        tenant_id: i64,
        channel_id: &str,
    ) -> Result<(), ZapdeskError>;

    /// The channel assigned to a user, if any.
    async fn find_user_channel(&self, user_id: i64) -> Result<Option<Channel>, ZapdeskError>;

    // --- Contacts ---

    async fn get_contact(&self, contact_id: &str) -> Result<Option<Contact>, ZapdeskError>;

    async fn find_contact(
        &self,
        tenant_id: i64,
        address: &str,
    ) -> Result<Option<Contact>, ZapdeskError>;

    /// Inserts a contact; returns [`ContactWrite::Conflict`] on a
    /// (tenant, address) uniqueness violation instead of an error.
    async fn insert_contact(&self, contact: &NewContact) -> Result<ContactWrite, ZapdeskError>;

    /// Updates the mutable fields; `None` leaves a field unchanged.
    async fn update_contact(
        &self,
        contact_id: &str,
        name: Option<&str>,
        profile_pic_url: Option<&str>,
    ) -> Result<Option<Contact>, ZapdeskError>;

    async fn list_contacts(&self, filter: &ContactFilter) -> Result<Vec<Contact>, ZapdeskError>;

    // --- Tickets ---

    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, ZapdeskError>;

    async fn find_active_ticket(
        &self,
        contact_id: &str,
        channel_id: &str,
    ) -> Result<Option<Ticket>, ZapdeskError>;

    /// Atomically returns the active ticket for the pair or creates one.
    ///
    /// The boolean is `true` when the ticket was created by this call.
    async fn find_or_create_ticket(
        &self,
        ticket: &NewTicket,
    ) -> Result<(Ticket, bool), ZapdeskError>;

    /// Writes `ticket` only if the stored version still equals
    /// `ticket.version`. Returns the stored row (version bumped) or `None`
    /// when another writer got there first.
    async fn update_ticket_if_version(
        &self,
        ticket: &Ticket,
    ) -> Result<Option<Ticket>, ZapdeskError>;

    /// Moves a ticket to `to` only if its status, assignee and queue still
    /// match `guard`.
    async fn transition_ticket_if(
        &self,
        ticket_id: &str,
        guard: TicketGuard,
        to: TicketStatus,
    ) -> Result<Option<Ticket>, ZapdeskError>;

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), ZapdeskError>;

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>, ZapdeskError>;

    /// Newest-first window of a ticket's messages plus the total count.
    async fn list_messages(
        &self,
        ticket_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64), ZapdeskError>;

    /// Marks unread inbound messages of a ticket read; returns those flipped.
    async fn mark_messages_read(&self, ticket_id: &str) -> Result<Vec<Message>, ZapdeskError>;

    // --- Dispatch jobs ---

    async fn enqueue_job(
        &self,
        queue_name: &str,
        payload: &str,
        max_attempts: u32,
    ) -> Result<i64, ZapdeskError>;

    /// Locks and returns the oldest due pending job, if any.
    async fn dequeue_job(
        &self,
        queue_name: &str,
        lock_timeout: Duration,
    ) -> Result<Option<QueueEntry>, ZapdeskError>;

    /// Terminal success: the row is deleted when `remove` is set.
    async fn complete_job(&self, job_id: i64, remove: bool) -> Result<(), ZapdeskError>;

    /// Records a failed attempt and reschedules after `retry_delay` unless
    /// the job has used all of its attempts.
    async fn fail_job(&self, job_id: i64, retry_delay: Duration)
    -> Result<JobFailure, ZapdeskError>;

    async fn remove_job(&self, job_id: i64) -> Result<(), ZapdeskError>;

    /// Returns jobs whose processing lock expired to `pending`.
    async fn requeue_stale_jobs(&self, queue_name: &str) -> Result<usize, ZapdeskError>;

    async fn count_jobs(&self, queue_name: &str) -> Result<i64, ZapdeskError>;
}
