// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable dispatch job queue and its worker pool.
//!
//! Jobs are rows in storage, so a crash between enqueue and delivery loses
//! nothing: locks of jobs a dead worker held expire and the job runs again.
//! Each job carries its own attempt counter. The channel is resolved when
//! the job runs, not when it was enqueued, since sessions may have rotated
//! in between.
//!
//! Outcomes are never returned to the enqueuer. Success records a message
//! (and its event); exhaustion publishes a `job delete` event.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use zapdesk_bus::EventBus;
use zapdesk_config::model::QueueConfig;
use zapdesk_core::types::{
    DispatchJob, EntityKind, EventAction, JobHandle, Message, QueueEntry, TenantContext,
};
use zapdesk_core::{StorageAdapter, ZapdeskError};

use crate::backoff::BackoffPolicy;
use crate::outbound::OutboundRecorder;
use crate::registry::ChannelRegistry;

/// Queue name used for media dispatch jobs.
pub const DISPATCH_QUEUE: &str = "dispatch";

pub struct JobQueue {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    registry: Arc<ChannelRegistry>,
    recorder: Arc<OutboundRecorder>,
    bus: Arc<EventBus>,
    backoff: BackoffPolicy,
    workers: usize,
    poll_interval: Duration,
    lock_timeout: Duration,
}

/// Handles of running workers, drained on shutdown.
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stops polling and waits for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!(error = %e, "dispatch worker panicked");
            }
        }
        info!("dispatch workers stopped");
    }
}

impl JobQueue {
    pub fn new(
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        registry: Arc<ChannelRegistry>,
        recorder: Arc<OutboundRecorder>,
        bus: Arc<EventBus>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            storage,
            registry,
            recorder,
            bus,
            backoff: BackoffPolicy::from_config(config),
            workers: config.workers.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            lock_timeout: Duration::from_secs(config.lock_timeout_secs),
        }
    }

    /// Persists a job and returns immediately.
    pub async fn enqueue(&self, job: &DispatchJob) -> Result<JobHandle, ZapdeskError> {
        let payload = serde_json::to_string(job)
            .map_err(|e| ZapdeskError::Internal(format!("job payload not serializable: {e}")))?;
        let job_id = self
            .storage
            .enqueue_job(DISPATCH_QUEUE, &payload, job.attempts_max.max(1))
            .await?;
        debug!(job_id, ticket_id = %job.ticket_id, channel_id = %job.channel_id, "dispatch job enqueued");
        Ok(JobHandle { job_id })
    }

    /// Returns jobs abandoned by a dead worker to the queue.
    pub async fn recover(&self) -> Result<usize, ZapdeskError> {
        let requeued = self.storage.requeue_stale_jobs(DISPATCH_QUEUE).await?;
        if requeued > 0 {
            info!(count = requeued, "stale dispatch jobs requeued");
        }
        Ok(requeued)
    }

    /// Jobs waiting or running.
    pub async fn open_jobs(&self) -> Result<i64, ZapdeskError> {
        self.storage.count_jobs(DISPATCH_QUEUE).await
    }

    /// Runs at most one due job. Returns whether a job was taken.
    pub async fn run_once(&self) -> Result<bool, ZapdeskError> {
        match self.storage.dequeue_job(DISPATCH_QUEUE, self.lock_timeout).await? {
            Some(entry) => {
                self.execute(entry).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Spawns the worker pool. Workers exit when `cancel` fires, after
    /// finishing the job in hand.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> WorkerPool {
        let handles = (0..self.workers)
            .map(|worker| {
                let queue = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { queue.worker_loop(worker, cancel).await })
            })
            .collect();
        info!(workers = self.workers, "dispatch workers started");
        WorkerPool { cancel, handles }
    }

    async fn worker_loop(&self, worker: usize, cancel: CancellationToken) {
        debug!(worker, "dispatch worker running");
        while !cancel.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(true) => false,
                Ok(false) => {
                    if let Err(e) = self.recover().await {
                        warn!(worker, error = %e, "stale job recovery failed");
                    }
                    true
                }
                Err(e) => {
                    warn!(worker, error = %e, "dequeue failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        debug!(worker, "dispatch worker exiting");
    }

    /// Polls until no job is pending or running, or `timeout` passes.
    pub async fn wait_idle(&self, timeout: Duration) -> Result<(), ZapdeskError> {
        let poll = self.poll_interval.min(Duration::from_millis(20));
        tokio::time::timeout(timeout, async {
            loop {
                if self.open_jobs().await? == 0 {
                    return Ok::<(), ZapdeskError>(());
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await
        .map_err(|_| ZapdeskError::Timeout { duration: timeout })?
    }

    async fn execute(&self, entry: QueueEntry) {
        let job: DispatchJob = match serde_json::from_str(&entry.payload) {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = entry.id, error = %e, "unreadable job payload, dropping");
                if let Err(e) = self.storage.remove_job(entry.id).await {
                    warn!(job_id = entry.id, error = %e, "could not drop job");
                }
                return;
            }
        };

        match self.deliver(&job).await {
            Ok(message) => {
                if let Err(e) = self
                    .storage
                    .complete_job(entry.id, job.remove_on_complete)
                    .await
                {
                    warn!(job_id = entry.id, error = %e, "could not acknowledge job");
                }
                info!(job_id = entry.id, message_id = %message.id, ticket_id = %job.ticket_id, "dispatch job delivered");
            }
            Err(e) => self.handle_failure(&entry, &job, e).await,
        }
    }

    async fn deliver(&self, job: &DispatchJob) -> Result<Message, ZapdeskError> {
        let ctx = TenantContext::new(job.tenant_id);
        let ticket = match self.storage.get_ticket(&job.ticket_id).await? {
            Some(ticket) if ticket.tenant_id == job.tenant_id => ticket,
            _ => {
                return Err(ZapdeskError::TicketNotFound {
                    ticket_id: job.ticket_id.clone(),
                });
            }
        };
        let (_, session) = self.registry.session_for(&ctx, &job.channel_id).await?;
        let media = job.data.media();
        let ack = session
            .send(&job.data.address, &job.data.body, media.as_ref(), None)
            .await?;
        self.recorder
            .record(&ticket, &job.data.body, &ack, media.as_ref(), None)
            .await
    }

    async fn handle_failure(&self, entry: &QueueEntry, job: &DispatchJob, cause: ZapdeskError) {
        let attempt = entry.attempts + 1;
        let delay = self.backoff.delay(attempt);
        let failure = match self.storage.fail_job(entry.id, delay).await {
            Ok(failure) => failure,
            Err(e) => {
                error!(job_id = entry.id, error = %e, "could not record job failure");
                return;
            }
        };

        if !failure.exhausted {
            warn!(
                job_id = entry.id,
                attempt = failure.attempts,
                max_attempts = entry.max_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %cause,
                "dispatch attempt failed, will retry"
            );
            return;
        }

        let exhausted = ZapdeskError::JobExhausted {
            job_id: entry.id,
            attempts: failure.attempts,
        };
        error!(job_id = entry.id, attempts = failure.attempts, error = %cause, "dispatch job exhausted");
        self.bus.publish(
            job.tenant_id,
            EntityKind::Job,
            EventAction::Delete,
            json!({
                "jobId": entry.id,
                "ticketId": job.ticket_id,
                "channelId": job.channel_id,
                "fileName": job.data.file_name,
                "attempts": failure.attempts,
                "code": exhausted.code(),
                "error": cause.to_string(),
            }),
        );
        if let Err(e) = self.storage.remove_job(entry.id).await {
            warn!(job_id = entry.id, error = %e, "could not remove exhausted job");
        }
    }
}
