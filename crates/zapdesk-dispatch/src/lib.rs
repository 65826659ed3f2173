// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message dispatch and ticket lifecycle for Zapdesk.
//!
//! [`DispatchService`] wires the components together over one storage
//! adapter and one event bus:
//! - [`ChannelRegistry`] picks the channel and serializes sends on it
//! - [`NumberValidator`] verifies and canonicalizes phone numbers
//! - [`ContactResolver`] finds or creates contacts by canonical address
//! - [`TicketLifecycleManager`] keeps one active ticket per contact/channel
//! - [`MessageDispatcher`] sends text inline and queues media
//! - [`JobQueue`] retries media jobs in a background worker pool

pub mod auto_close;
pub mod backoff;
pub mod contacts;
pub mod dispatcher;
pub mod history;
pub mod locks;
pub mod outbound;
pub mod queue;
pub mod registry;
pub mod shutdown;
pub mod template;
pub mod tickets;
pub mod validator;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use zapdesk_bus::EventBus;
use zapdesk_config::ZapdeskConfig;
use zapdesk_core::StorageAdapter;

pub use contacts::{ContactDetails, ContactResolver};
pub use dispatcher::{DispatchOutcome, DispatcherParts, MessageDispatcher, SendReceipt, SendToNumber};
pub use history::MessageHistory;
pub use queue::{DISPATCH_QUEUE, JobQueue, WorkerPool};
pub use registry::{ChannelRegistry, ChannelSession};
pub use tickets::TicketLifecycleManager;
pub use validator::NumberValidator;

/// The assembled dispatch stack.
///
/// Components are exposed as shared handles so hosts (and tests) can call
/// any of them directly.
pub struct DispatchService {
    pub storage: Arc<dyn StorageAdapter + Send + Sync>,
    pub bus: Arc<EventBus>,
    pub registry: Arc<ChannelRegistry>,
    pub contacts: Arc<ContactResolver>,
    pub tickets: Arc<TicketLifecycleManager>,
    pub history: Arc<MessageHistory>,
    pub queue: Arc<JobQueue>,
    pub dispatcher: Arc<MessageDispatcher>,
}

impl DispatchService {
    /// Builds every component from configuration. Storage must already be
    /// initialized.
    pub fn new(config: &ZapdeskConfig, storage: Arc<dyn StorageAdapter + Send + Sync>) -> Self {
        let bus = Arc::new(EventBus::new(config.bus.capacity));
        let registry = Arc::new(ChannelRegistry::new(Arc::clone(&storage), &config.channels));
        let contacts = Arc::new(ContactResolver::new(Arc::clone(&storage), Arc::clone(&bus)));
        let tickets = Arc::new(TicketLifecycleManager::new(
            Arc::clone(&storage),
            Arc::clone(&bus),
            &config.tickets,
        ));
        let history = Arc::new(MessageHistory::new(
            Arc::clone(&storage),
            Arc::clone(&bus),
            &config.history,
        ));
        let recorder = Arc::new(outbound::OutboundRecorder::new(
            Arc::clone(&storage),
            Arc::clone(&bus),
            Arc::clone(&tickets),
        ));
        let queue = Arc::new(JobQueue::new(
            Arc::clone(&storage),
            Arc::clone(&registry),
            Arc::clone(&recorder),
            Arc::clone(&bus),
            &config.queue,
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            DispatcherParts {
                registry: Arc::clone(&registry),
                contacts: Arc::clone(&contacts),
                tickets: Arc::clone(&tickets),
                history: Arc::clone(&history),
                queue: Arc::clone(&queue),
                recorder,
            },
            config.queue.max_attempts,
            Duration::from_millis(config.tickets.auto_close_delay_ms),
        ));

        Self {
            storage,
            bus,
            registry,
            contacts,
            tickets,
            history,
            queue,
            dispatcher,
        }
    }

    /// Requeues jobs left locked by a previous process, then starts workers.
    pub async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<WorkerPool, zapdesk_core::ZapdeskError> {
        self.queue.recover().await?;
        Ok(self.queue.start(cancel))
    }

    /// Stops timers and driver sessions. Workers are drained separately
    /// through [`WorkerPool::shutdown`].
    pub async fn shutdown(&self) {
        self.tickets.shutdown();
        self.registry.shutdown().await;
        info!("dispatch service stopped");
    }
}
