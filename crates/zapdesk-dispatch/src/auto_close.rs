// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deferred, cancelable ticket closing.
//!
//! Each scheduled close is a spawned task racing a sleep against a
//! [`CancellationToken`]. Scheduling again for the same ticket supersedes
//! the earlier timer. When the sleep wins, the ticket is closed only if its
//! status, assignee and queue are still the ones captured at scheduling
//! time; otherwise the fire is a no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use zapdesk_bus::EventBus;
use zapdesk_core::types::{EntityKind, EventAction, Ticket, TicketGuard, TicketStatus};
use zapdesk_core::StorageAdapter;

#[derive(Clone)]
pub struct AutoCloseScheduler {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    bus: Arc<EventBus>,
    pending: Arc<DashMap<String, (u64, CancellationToken)>>,
    generation: Arc<AtomicU64>,
    root: CancellationToken,
}

impl AutoCloseScheduler {
    pub fn new(storage: Arc<dyn StorageAdapter + Send + Sync>, bus: Arc<EventBus>) -> Self {
        Self {
            storage,
            bus,
            pending: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            root: CancellationToken::new(),
        }
    }

    /// Schedules `ticket` to close after `delay`. Returns `false` when the
    /// ticket is already closed.
    pub fn schedule(&self, ticket: &Ticket, delay: Duration) -> bool {
        if !ticket.status.is_active() {
            return false;
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        if let Some((_, previous)) = self
            .pending
            .insert(ticket.id.clone(), (generation, token.clone()))
        {
            previous.cancel();
            debug!(ticket_id = %ticket.id, "earlier auto-close superseded");
        }

        let storage = Arc::clone(&self.storage);
        let bus = Arc::clone(&self.bus);
        let pending = Arc::clone(&self.pending);
        let ticket_id = ticket.id.clone();
        let tenant_id = ticket.tenant_id;
        let captured = TicketGuard::of(ticket);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(ticket_id = %ticket_id, "auto-close cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    fire(storage.as_ref(), &bus, &ticket_id, tenant_id, captured).await;
                }
            }
            pending.remove_if(&ticket_id, |_, (g, _)| *g == generation);
        });

        debug!(ticket_id = %ticket.id, delay_ms = delay.as_millis() as u64, "auto-close scheduled");
        true
    }

    /// Cancels the pending close of a ticket, if any.
    pub fn cancel(&self, ticket_id: &str) -> bool {
        match self.pending.remove(ticket_id) {
            Some((_, (_, token))) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancels every pending close.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.pending.clear();
    }
}

async fn fire(
    storage: &(dyn StorageAdapter + Send + Sync),
    bus: &EventBus,
    ticket_id: &str,
    tenant_id: i64,
    captured: TicketGuard,
) {
    match storage
        .transition_ticket_if(ticket_id, captured, TicketStatus::Closed)
        .await
    {
        Ok(Some(closed)) => {
            info!(ticket_id, "ticket auto-closed");
            bus.publish_record(tenant_id, EntityKind::Ticket, EventAction::Update, &closed);
        }
        Ok(None) => {
            debug!(
                ticket_id,
                expected = %captured.status,
                user_id = ?captured.user_id,
                "ticket changed since scheduling, auto-close skipped"
            );
        }
        Err(e) => {
            warn!(ticket_id, error = %e, "auto-close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapdesk_core::types::{CanonicalAddress, ContactWrite, NewContact, NewTicket};
    use zapdesk_test_utils::storage::{channel, temp_storage};

    async fn open_ticket(storage: &Arc<dyn StorageAdapter + Send + Sync>) -> Ticket {
        storage.upsert_channel(&channel("ch", 1, true)).await.unwrap();
        let ContactWrite::Created(contact) = storage
            .insert_contact(&NewContact {
                tenant_id: 1,
                address: CanonicalAddress::normalize("5550100").unwrap(),
                name: None,
                profile_pic_url: None,
                is_group: false,
            })
            .await
            .unwrap()
        else {
            panic!("contact not created");
        };
        let (ticket, _) = storage
            .find_or_create_ticket(&NewTicket {
                tenant_id: 1,
                contact_id: contact.id,
                channel_id: "ch".into(),
                status: TicketStatus::Open,
                queue_id: None,
            })
            .await
            .unwrap();
        ticket
    }

    #[tokio::test]
    async fn fires_after_delay() {
        let (storage, _dir) = temp_storage().await.unwrap();
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe(1);
        let ticket = open_ticket(&storage).await;
        let scheduler = AutoCloseScheduler::new(Arc::clone(&storage), bus);

        assert!(scheduler.schedule(&ticket, Duration::from_millis(20)));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.payload["status"], "closed");

        let stored = storage.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Closed);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancel_prevents_close() {
        let (storage, _dir) = temp_storage().await.unwrap();
        let ticket = open_ticket(&storage).await;
        let scheduler = AutoCloseScheduler::new(Arc::clone(&storage), Arc::new(EventBus::default()));

        scheduler.schedule(&ticket, Duration::from_millis(30));
        assert!(scheduler.cancel(&ticket.id));
        tokio::time::sleep(Duration::from_millis(80)).await;

        let stored = storage.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn stale_fire_is_a_noop() {
        let (storage, _dir) = temp_storage().await.unwrap();
        let ticket = open_ticket(&storage).await;
        let scheduler = AutoCloseScheduler::new(Arc::clone(&storage), Arc::new(EventBus::default()));

        // Captured as open; someone moves it to pending before the fire.
        scheduler.schedule(&ticket, Duration::from_millis(30));
        storage
            .transition_ticket_if(&ticket.id, TicketGuard::of(&ticket), TicketStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let stored = storage.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Pending);
    }

    #[tokio::test]
    async fn reassignment_outside_the_manager_skips_close() {
        let (storage, _dir) = temp_storage().await.unwrap();
        let ticket = open_ticket(&storage).await;
        let scheduler = AutoCloseScheduler::new(Arc::clone(&storage), Arc::new(EventBus::default()));

        scheduler.schedule(&ticket, Duration::from_millis(30));
        let mut assign = ticket.clone();
        assign.user_id = Some(9);
        storage.update_ticket_if_version(&assign).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let stored = storage.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Open);
        assert_eq!(stored.user_id, Some(9));
    }

    #[tokio::test]
    async fn rescheduling_supersedes() {
        let (storage, _dir) = temp_storage().await.unwrap();
        let ticket = open_ticket(&storage).await;
        let scheduler = AutoCloseScheduler::new(Arc::clone(&storage), Arc::new(EventBus::default()));

        scheduler.schedule(&ticket, Duration::from_millis(20));
        scheduler.schedule(&ticket, Duration::from_secs(60));
        assert_eq!(scheduler.pending_count(), 1);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let stored = storage.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Open);
        scheduler.shutdown();
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_tickets_are_not_scheduled() {
        let (storage, _dir) = temp_storage().await.unwrap();
        let mut ticket = open_ticket(&storage).await;
        ticket.status = TicketStatus::Closed;
        let scheduler = AutoCloseScheduler::new(storage, Arc::new(EventBus::default()));
        assert!(!scheduler.schedule(&ticket, Duration::from_millis(1)));
        assert_eq!(scheduler.pending_count(), 0);
    }
}
