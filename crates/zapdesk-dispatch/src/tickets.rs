// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket lifecycle: find-or-create, guarded updates, and auto-close.
//!
//! At most one active (pending or open) ticket exists per contact/channel
//! pair. Find-or-create is serialized per pair in-process with
//! [`KeyedLocks`], and storage backs it with a transaction plus a partial
//! unique index, so concurrent callers all observe the same ticket.
//!
//! Updates are optimistic: read, apply the patch, write only if the
//! version is unchanged, and retry on a lost race.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use zapdesk_bus::EventBus;
use zapdesk_config::model::TicketsConfig;
use zapdesk_core::types::{
    Contact, EntityKind, EventAction, NewTicket, Ticket, TicketPatch, TicketStatus,
};
use zapdesk_core::{StorageAdapter, ZapdeskError};

use crate::auto_close::AutoCloseScheduler;
use crate::locks::KeyedLocks;

const MAX_UPDATE_ATTEMPTS: usize = 3;

pub struct TicketLifecycleManager {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    bus: Arc<EventBus>,
    locks: KeyedLocks,
    auto_close: AutoCloseScheduler,
    initial_status: TicketStatus,
}

impl TicketLifecycleManager {
    pub fn new(
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        bus: Arc<EventBus>,
        config: &TicketsConfig,
    ) -> Self {
        let auto_close = AutoCloseScheduler::new(Arc::clone(&storage), Arc::clone(&bus));
        let initial_status = if config.queueing_enabled {
            TicketStatus::Pending
        } else {
            TicketStatus::Open
        };
        Self {
            storage,
            bus,
            locks: KeyedLocks::new(),
            auto_close,
            initial_status,
        }
    }

    /// Returns the active ticket for the contact on `channel_id`, creating
    /// one if there is none. Existing tickets are returned unchanged.
    pub async fn find_or_create(
        &self,
        contact: &Contact,
        channel_id: &str,
        queue_id: Option<i64>,
        tenant_id: i64,
    ) -> Result<Ticket, ZapdeskError> {
        if contact.tenant_id != tenant_id {
            return Err(ZapdeskError::ContactNotFound {
                contact_id: contact.id.clone(),
            });
        }

        let _guard = self.locks.lock(format!("{}:{channel_id}", contact.id)).await;
        let (ticket, created) = self
            .storage
            .find_or_create_ticket(&NewTicket {
                tenant_id,
                contact_id: contact.id.clone(),
                channel_id: channel_id.to_string(),
                status: self.initial_status,
                queue_id,
            })
            .await?;

        if created {
            info!(tenant_id, ticket_id = %ticket.id, contact_id = %contact.id, channel_id, status = %ticket.status, "ticket created");
            self.bus
                .publish_record(tenant_id, EntityKind::Ticket, EventAction::Create, &ticket);
        } else {
            debug!(ticket_id = %ticket.id, "reusing active ticket");
        }
        Ok(ticket)
    }

    /// The contact's active ticket on `channel_id`, without creating one.
    pub async fn find_active(
        &self,
        contact: &Contact,
        channel_id: &str,
    ) -> Result<Option<Ticket>, ZapdeskError> {
        self.storage.find_active_ticket(&contact.id, channel_id).await
    }

    /// Loads a ticket, hiding other tenants' rows.
    pub async fn show(&self, ticket_id: &str, tenant_id: i64) -> Result<Ticket, ZapdeskError> {
        match self.storage.get_ticket(ticket_id).await? {
            Some(ticket) if ticket.tenant_id == tenant_id => Ok(ticket),
            _ => Err(ZapdeskError::TicketNotFound {
                ticket_id: ticket_id.to_string(),
            }),
        }
    }

    /// Applies `patch` with compare-and-swap on the ticket version.
    ///
    /// Status or assignee changes cancel a pending auto-close, so a manual
    /// reopen during the delay window is never overwritten.
    pub async fn update(
        &self,
        ticket_id: &str,
        patch: &TicketPatch,
        tenant_id: i64,
    ) -> Result<Ticket, ZapdeskError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current = self.show(ticket_id, tenant_id).await?;
            if patch.touches_lifecycle() && self.auto_close.cancel(ticket_id) {
                debug!(ticket_id, "pending auto-close cancelled by update");
            }

            let next = patch.apply(&current);
            if next == current {
                return Ok(current);
            }

            match self.storage.update_ticket_if_version(&next).await? {
                Some(saved) => {
                    debug!(ticket_id, version = saved.version, status = %saved.status, "ticket updated");
                    self.bus
                        .publish_record(tenant_id, EntityKind::Ticket, EventAction::Update, &saved);
                    return Ok(saved);
                }
                None => {
                    debug!(ticket_id, attempt, "ticket changed concurrently, retrying update");
                }
            }
        }
        Err(ZapdeskError::Conflict(format!(
            "ticket {ticket_id} kept changing; gave up after {MAX_UPDATE_ATTEMPTS} attempts"
        )))
    }

    /// Closes `ticket` after `delay` unless its status changes first.
    pub fn schedule_auto_close(&self, ticket: &Ticket, delay: Duration) -> bool {
        self.auto_close.schedule(ticket, delay)
    }

    pub fn cancel_auto_close(&self, ticket_id: &str) -> bool {
        self.auto_close.cancel(ticket_id)
    }

    pub fn pending_auto_closes(&self) -> usize {
        self.auto_close.pending_count()
    }

    pub fn shutdown(&self) {
        self.auto_close.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapdesk_bus::Event;
    use zapdesk_core::types::{CanonicalAddress, ContactWrite, NewContact};
    use zapdesk_test_utils::storage::{channel, temp_storage};

    struct Fixture {
        manager: Arc<TicketLifecycleManager>,
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        bus: Arc<EventBus>,
        contact: Contact,
        _dir: tempfile::TempDir,
    }

    async fn fixture(queueing_enabled: bool) -> Fixture {
        let (storage, dir) = temp_storage().await.unwrap();
        storage.upsert_channel(&channel("ch", 1, true)).await.unwrap();
        let ContactWrite::Created(contact) = storage
            .insert_contact(&NewContact {
                tenant_id: 1,
                address: CanonicalAddress::normalize("5550100").unwrap(),
                name: Some("Ann".into()),
                profile_pic_url: None,
                is_group: false,
            })
            .await
            .unwrap()
        else {
            panic!("contact not created");
        };
        let bus = Arc::new(EventBus::new(64));
        let config = TicketsConfig {
            queueing_enabled,
            ..TicketsConfig::default()
        };
        let manager = Arc::new(TicketLifecycleManager::new(
            Arc::clone(&storage),
            Arc::clone(&bus),
            &config,
        ));
        Fixture {
            manager,
            storage,
            bus,
            contact,
            _dir: dir,
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn new_ticket_status_follows_queueing() {
        let queued = fixture(true).await;
        let t = queued
            .manager
            .find_or_create(&queued.contact, "ch", Some(3), 1)
            .await
            .unwrap();
        assert_eq!(t.status, TicketStatus::Pending);
        assert_eq!(t.queue_id, Some(3));
        assert!(t.last_message.is_empty());

        let direct = fixture(false).await;
        let t = direct
            .manager
            .find_or_create(&direct.contact, "ch", None, 1)
            .await
            .unwrap();
        assert_eq!(t.status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn existing_active_ticket_is_returned_unchanged() {
        let f = fixture(true).await;
        let mut rx = f.bus.subscribe(1);
        let first = f.manager.find_or_create(&f.contact, "ch", None, 1).await.unwrap();
        let second = f.manager.find_or_create(&f.contact, "ch", Some(9), 1).await.unwrap();
        assert_eq!(first, second);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, EventAction::Create);
    }

    #[tokio::test]
    async fn concurrent_find_or_create_yields_one_active_ticket() {
        let f = fixture(true).await;
        let mut handles = Vec::new();
        for _ in 0..10 {
            let manager = Arc::clone(&f.manager);
            let contact = f.contact.clone();
            handles.push(tokio::spawn(async move {
                manager.find_or_create(&contact, "ch", None, 1).await
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap().id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn foreign_contact_is_rejected() {
        let f = fixture(true).await;
        let err = f
            .manager
            .find_or_create(&f.contact, "ch", None, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ZapdeskError::ContactNotFound { .. }));
    }

    #[tokio::test]
    async fn update_applies_patch_and_checks_tenant() {
        let f = fixture(true).await;
        let ticket = f.manager.find_or_create(&f.contact, "ch", None, 1).await.unwrap();

        let patch = TicketPatch {
            status: Some(TicketStatus::Open),
            user_id: Some(Some(7)),
            ..TicketPatch::default()
        };
        let updated = f.manager.update(&ticket.id, &patch, 1).await.unwrap();
        assert_eq!(updated.status, TicketStatus::Open);
        assert_eq!(updated.user_id, Some(7));
        assert!(updated.version > ticket.version);

        let err = f.manager.update(&ticket.id, &patch, 2).await.unwrap_err();
        assert!(matches!(err, ZapdeskError::TicketNotFound { .. }));
        let err = f.manager.update("missing", &patch, 1).await.unwrap_err();
        assert!(matches!(err, ZapdeskError::TicketNotFound { .. }));
    }

    #[tokio::test]
    async fn noop_patch_does_not_write() {
        let f = fixture(true).await;
        let ticket = f.manager.find_or_create(&f.contact, "ch", None, 1).await.unwrap();
        let same = f
            .manager
            .update(&ticket.id, &TicketPatch::status(TicketStatus::Pending), 1)
            .await
            .unwrap();
        assert_eq!(same.version, ticket.version);
    }

    #[tokio::test]
    async fn concurrent_updates_all_land() {
        let f = fixture(true).await;
        let ticket = f.manager.find_or_create(&f.contact, "ch", None, 1).await.unwrap();

        let touch = TicketPatch::last_message("one");
        let requeue = TicketPatch {
            queue_id: Some(Some(4)),
            ..TicketPatch::default()
        };
        let a = f.manager.update(&ticket.id, &touch, 1);
        let b = f.manager.update(&ticket.id, &requeue, 1);
        let (a, b) = tokio::join!(a, b);
        a.unwrap();
        b.unwrap();

        let stored = f.storage.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message, "one");
        assert_eq!(stored.queue_id, Some(4));
    }

    #[tokio::test]
    async fn manual_reopen_survives_scheduled_close() {
        let f = fixture(false).await;
        let ticket = f.manager.find_or_create(&f.contact, "ch", None, 1).await.unwrap();
        assert!(f.manager.schedule_auto_close(&ticket, Duration::from_millis(40)));

        f.manager
            .update(&ticket.id, &TicketPatch::status(TicketStatus::Closed), 1)
            .await
            .unwrap();
        f.manager
            .update(&ticket.id, &TicketPatch::status(TicketStatus::Open), 1)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stored = f.manager.show(&ticket.id, 1).await.unwrap();
        assert_eq!(stored.status, TicketStatus::Open);
        assert_eq!(f.manager.pending_auto_closes(), 0);
    }

    #[tokio::test]
    async fn last_message_update_keeps_auto_close() {
        let f = fixture(false).await;
        let ticket = f.manager.find_or_create(&f.contact, "ch", None, 1).await.unwrap();
        f.manager.schedule_auto_close(&ticket, Duration::from_millis(40));
        f.manager
            .update(&ticket.id, &TicketPatch::last_message("bye"), 1)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stored = f.manager.show(&ticket.id, 1).await.unwrap();
        assert_eq!(stored.status, TicketStatus::Closed);
        assert_eq!(stored.last_message, "bye");
    }
}
