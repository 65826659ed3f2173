// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant-scoped event bus.
//!
//! Each tenant gets its own `tokio::sync::broadcast` channel, created on first
//! use. Publishing never blocks and never fails: with no subscribers the event
//! is dropped, and a subscriber that falls more than `capacity` events behind
//! loses the oldest ones. A tenant whose last subscriber is gone loses its
//! channel on the next publish. Events published from one task are received
//! in publish order, which gives per-entity FIFO.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use zapdesk_core::types::{EntityKind, EventAction, now_timestamp};

/// A notification delivered to real-time subscribers of one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub tenant_id: i64,
    pub entity_kind: EntityKind,
    pub action: EventAction,
    pub payload: serde_json::Value,
    pub published_at: String,
}

/// Per-tenant broadcast fan-out.
pub struct EventBus {
    capacity: usize,
    tenants: DashMap<i64, broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tenants: DashMap::new(),
        }
    }

    /// Subscribe to every event of `tenant_id` published from now on.
    pub fn subscribe(&self, tenant_id: i64) -> broadcast::Receiver<Event> {
        // Subscribe under the entry lock so pruning cannot drop the sender
        // between lookup and subscribe.
        self.tenants
            .entry(tenant_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Fire-and-forget publish. Returns the number of subscribers reached.
    pub fn publish(
        &self,
        tenant_id: i64,
        entity_kind: EntityKind,
        action: EventAction,
        payload: serde_json::Value,
    ) -> usize {
        let event = Event {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            entity_kind,
            action,
            payload,
            published_at: now_timestamp(),
        };
        let Some(sender) = self.tenants.get(&tenant_id).map(|s| s.clone()) else {
            trace!(tenant_id, %entity_kind, %action, "no subscribers, event dropped");
            return 0;
        };
        match sender.send(event) {
            Ok(reached) => reached,
            Err(_) => {
                if self
                    .tenants
                    .remove_if(&tenant_id, |_, s| s.receiver_count() == 0)
                    .is_some()
                {
                    trace!(tenant_id, "last subscriber gone, tenant channel dropped");
                }
                trace!(tenant_id, %entity_kind, %action, "no subscribers, event dropped");
                0
            }
        }
    }

    /// Serializes `record` and publishes it. Serialization failures are logged
    /// and swallowed, like any other undeliverable event.
    pub fn publish_record<T: Serialize>(
        &self,
        tenant_id: i64,
        entity_kind: EntityKind,
        action: EventAction,
        record: &T,
    ) -> usize {
        match serde_json::to_value(record) {
            Ok(payload) => self.publish(tenant_id, entity_kind, action, payload),
            Err(e) => {
                tracing::warn!(tenant_id, %entity_kind, error = %e, "event payload not serializable");
                0
            }
        }
    }

    /// Number of live subscribers for a tenant.
    pub fn subscriber_count(&self, tenant_id: i64) -> usize {
        self.tenants
            .get(&tenant_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
