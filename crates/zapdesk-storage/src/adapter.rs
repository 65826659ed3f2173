// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use zapdesk_config::model::StorageConfig;
use zapdesk_core::types::{
    Channel, ChannelStatus, Contact, ContactFilter, ContactWrite, JobFailure, Message, NewContact,
    NewTicket, QueueEntry, Ticket, TicketGuard, TicketStatus,
};
use zapdesk_core::{AdapterType, HealthStatus, PluginAdapter, StorageAdapter, ZapdeskError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened on the first call to
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: StorageAdapter::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, ZapdeskError> {
        self.db.get().ok_or_else(|| ZapdeskError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(db: &Database) -> Result<(), ZapdeskError> {
        db.connection()
            .call(|conn| conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(())))
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ZapdeskError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZapdeskError> {
        if let Some(db) = self.db.get() {
            Self::checkpoint(db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ZapdeskError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ZapdeskError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ZapdeskError> {
        Self::checkpoint(self.db()?).await
    }

    // --- Channels ---

    async fn upsert_channel(&self, channel: &Channel) -> Result<(), ZapdeskError> {
        queries::channels::upsert_channel(self.db()?, channel).await
    }

    async fn set_channel_status(
        &self,
        channel_id: &str,
        status: ChannelStatus,
    ) -> Result<(), ZapdeskError> {
        queries::channels::set_channel_status(self.db()?, channel_id, status).await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>, ZapdeskError> {
        queries::channels::get_channel(self.db()?, channel_id).await
    }

    async fn list_channels(&self, tenant_id: i64) -> Result<Vec<Channel>, ZapdeskError> {
        queries::channels::list_channels(self.db()?, tenant_id).await
    }

    async fn assign_user_channel(
        &self,
        user_id: i64,
        tenant_id: i64,
        channel_id: &str,
    ) -> Result<(), ZapdeskError> {
        queries::channels::assign_user_channel(self.db()?, user_id, tenant_id, channel_id).await
    }

    async fn find_user_channel(&self, user_id: i64) -> Result<Option<Channel>, ZapdeskError> {
        queries::channels::find_user_channel(self.db()?, user_id).await
    }

    // --- Contacts ---

    async fn get_contact(&self, contact_id: &str) -> Result<Option<Contact>, ZapdeskError> {
        queries::contacts::get_contact(self.db()?, contact_id).await
    }

    async fn find_contact(
        &self,
        tenant_id: i64,
        address: &str,
    ) -> Result<Option<Contact>, ZapdeskError> {
        queries::contacts::find_contact(self.db()?, tenant_id, address).await
    }

    async fn insert_contact(&self, contact: &NewContact) -> Result<ContactWrite, ZapdeskError> {
        queries::contacts::insert_contact(self.db()?, contact).await
    }

    async fn update_contact(
        &self,
        contact_id: &str,
        name: Option<&str>,
        profile_pic_url: Option<&str>,
    ) -> Result<Option<Contact>, ZapdeskError> {
        queries::contacts::update_contact(self.db()?, contact_id, name, profile_pic_url).await
    }

    async fn list_contacts(&self, filter: &ContactFilter) -> Result<Vec<Contact>, ZapdeskError> {
        queries::contacts::list_contacts(self.db()?, filter).await
    }

    // --- Tickets ---

    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, ZapdeskError> {
        queries::tickets::get_ticket(self.db()?, ticket_id).await
    }

    async fn find_active_ticket(
        &self,
        contact_id: &str,
        channel_id: &str,
    ) -> Result<Option<Ticket>, ZapdeskError> {
        queries::tickets::find_active_ticket(self.db()?, contact_id, channel_id).await
    }

    async fn find_or_create_ticket(
        &self,
        ticket: &NewTicket,
    ) -> Result<(Ticket, bool), ZapdeskError> {
        queries::tickets::find_or_create_ticket(self.db()?, ticket).await
    }

    async fn update_ticket_if_version(
        &self,
        ticket: &Ticket,
    ) -> Result<Option<Ticket>, ZapdeskError> {
        queries::tickets::update_ticket_if_version(self.db()?, ticket).await
    }

    async fn transition_ticket_if(
        &self,
        ticket_id: &str,
        guard: TicketGuard,
        to: TicketStatus,
    ) -> Result<Option<Ticket>, ZapdeskError> {
        queries::tickets::transition_ticket_if(self.db()?, ticket_id, guard, to).await
    }

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), ZapdeskError> {
        queries::messages::insert_message(self.db()?, message).await
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>, ZapdeskError> {
        queries::messages::get_message(self.db()?, message_id).await
    }

    async fn list_messages(
        &self,
        ticket_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64), ZapdeskError> {
        queries::messages::list_messages(self.db()?, ticket_id, limit, offset).await
    }

    async fn mark_messages_read(&self, ticket_id: &str) -> Result<Vec<Message>, ZapdeskError> {
        queries::messages::mark_messages_read(self.db()?, ticket_id).await
    }

    // --- Dispatch jobs ---

    async fn enqueue_job(
        &self,
        queue_name: &str,
        payload: &str,
        max_attempts: u32,
    ) -> Result<i64, ZapdeskError> {
        queries::queue::enqueue(self.db()?, queue_name, payload, max_attempts).await
    }

    async fn dequeue_job(
        &self,
        queue_name: &str,
        lock_timeout: Duration,
    ) -> Result<Option<QueueEntry>, ZapdeskError> {
        queries::queue::dequeue(self.db()?, queue_name, lock_timeout).await
    }

    async fn complete_job(&self, job_id: i64, remove: bool) -> Result<(), ZapdeskError> {
        queries::queue::complete(self.db()?, job_id, remove).await
    }

    async fn fail_job(
        &self,
        job_id: i64,
        retry_delay: Duration,
    ) -> Result<JobFailure, ZapdeskError> {
        queries::queue::fail(self.db()?, job_id, retry_delay).await
    }

    async fn remove_job(&self, job_id: i64) -> Result<(), ZapdeskError> {
        queries::queue::remove(self.db()?, job_id).await
    }

    async fn requeue_stale_jobs(&self, queue_name: &str) -> Result<usize, ZapdeskError> {
        queries::queue::requeue_stale(self.db()?, queue_name).await
    }

    async fn count_jobs(&self, queue_name: &str) -> Result<i64, ZapdeskError> {
        queries::queue::count_open(self.db()?, queue_name).await
    }
}
