// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live channel sessions and outbound channel selection.
//!
//! The registry pairs the channel rows kept in storage (whose connectivity
//! is written by the external driver) with the driver handles registered in
//! this process. A channel is usable only when both agree: storage reports
//! it connected and a session for it is registered here.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use zapdesk_config::model::ChannelsConfig;
use zapdesk_core::types::{
    Channel, HealthStatus, MediaRef, PhonebookEntry, SendAck, TenantContext,
};
use zapdesk_core::{ChannelDriver, StorageAdapter, ZapdeskError};

/// A registered driver for one channel.
///
/// All sends go through [`ChannelSession::send`], which allows one call in
/// flight per channel so protocol writes never interleave.
pub struct ChannelSession {
    channel_id: String,
    driver: Arc<dyn ChannelDriver>,
    send_lock: Mutex<()>,
    send_timeout: Duration,
    verify_timeout: Duration,
}

impl ChannelSession {
    pub fn new(
        channel_id: impl Into<String>,
        driver: Arc<dyn ChannelDriver>,
        send_timeout: Duration,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            driver,
            send_lock: Mutex::new(()),
            send_timeout,
            verify_timeout,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// Sends one message, serialized against every other send on this channel.
    pub async fn send(
        &self,
        address: &str,
        body: &str,
        media: Option<&MediaRef>,
        quoted_external_id: Option<&str>,
    ) -> Result<SendAck, ZapdeskError> {
        let _guard = self.send_lock.lock().await;
        debug!(channel_id = %self.channel_id, address, has_media = media.is_some(), "sending");
        let call = self.driver.send(address, body, media, quoted_external_id);
        match tokio::time::timeout(self.send_timeout, call).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(e @ ZapdeskError::ChannelSend { .. })) => Err(e),
            Ok(Err(e)) => Err(ZapdeskError::ChannelSend {
                channel_id: self.channel_id.clone(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            }),
            Err(_) => Err(ZapdeskError::Timeout {
                duration: self.send_timeout,
            }),
        }
    }

    /// Asks the network whether `number` exists. Not serialized with sends.
    pub async fn verify(&self, number: &str) -> Result<Option<String>, ZapdeskError> {
        tokio::time::timeout(self.verify_timeout, self.driver.verify_number(number))
            .await
            .map_err(|_| ZapdeskError::Timeout {
                duration: self.verify_timeout,
            })?
    }

    pub async fn profile_pic_url(&self, address: &str) -> Result<Option<String>, ZapdeskError> {
        tokio::time::timeout(self.verify_timeout, self.driver.profile_pic_url(address))
            .await
            .map_err(|_| ZapdeskError::Timeout {
                duration: self.verify_timeout,
            })?
    }

    pub async fn fetch_contacts(&self) -> Result<Vec<PhonebookEntry>, ZapdeskError> {
        tokio::time::timeout(self.send_timeout, self.driver.fetch_contacts())
            .await
            .map_err(|_| ZapdeskError::Timeout {
                duration: self.send_timeout,
            })?
    }
}

/// Explicit table of live channel sessions, passed to every component that
/// needs to talk to the network.
pub struct ChannelRegistry {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    sessions: DashMap<String, Arc<ChannelSession>>,
    send_timeout: Duration,
    verify_timeout: Duration,
}

impl ChannelRegistry {
    pub fn new(storage: Arc<dyn StorageAdapter + Send + Sync>, config: &ChannelsConfig) -> Self {
        Self {
            storage,
            sessions: DashMap::new(),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            verify_timeout: Duration::from_millis(config.verify_timeout_ms),
        }
    }

    /// Registers (or replaces) the driver serving `channel_id`.
    pub fn register(
        &self,
        channel_id: &str,
        driver: Arc<dyn ChannelDriver>,
    ) -> Arc<ChannelSession> {
        let session = Arc::new(ChannelSession::new(
            channel_id,
            driver,
            self.send_timeout,
            self.verify_timeout,
        ));
        if self
            .sessions
            .insert(channel_id.to_string(), Arc::clone(&session))
            .is_some()
        {
            info!(channel_id, "channel session replaced");
        } else {
            info!(channel_id, driver = session.driver_name(), "channel session registered");
        }
        session
    }

    pub fn unregister(&self, channel_id: &str) -> Option<Arc<ChannelSession>> {
        let removed = self.sessions.remove(channel_id).map(|(_, s)| s);
        if removed.is_some() {
            info!(channel_id, "channel session unregistered");
        }
        removed
    }

    pub fn session(&self, channel_id: &str) -> Option<Arc<ChannelSession>> {
        self.sessions.get(channel_id).map(|s| Arc::clone(s.value()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn usable(&self, channel: &Channel) -> bool {
        channel.is_connected() && self.sessions.contains_key(&channel.id)
    }

    /// Picks the outbound channel for a tenant/user.
    ///
    /// Order: the user's assigned channel, then the tenant default, then any
    /// other usable channel of the tenant.
    pub async fn resolve(&self, ctx: &TenantContext) -> Result<Channel, ZapdeskError> {
        if let Some(user_id) = ctx.user_id {
            if let Some(channel) = self.storage.find_user_channel(user_id).await? {
                if channel.tenant_id == ctx.tenant_id && self.usable(&channel) {
                    debug!(tenant_id = ctx.tenant_id, user_id, channel_id = %channel.id, "resolved user channel");
                    return Ok(channel);
                }
                debug!(user_id, channel_id = %channel.id, "user channel unusable, falling back");
            }
        }

        let channels = self.storage.list_channels(ctx.tenant_id).await?;
        let picked = channels
            .iter()
            .find(|c| c.is_default && self.usable(c))
            .or_else(|| channels.iter().find(|c| self.usable(c)))
            .cloned();

        match picked {
            Some(channel) => {
                debug!(tenant_id = ctx.tenant_id, channel_id = %channel.id, "resolved tenant channel");
                Ok(channel)
            }
            None => Err(ZapdeskError::NoChannelConnected {
                tenant_id: ctx.tenant_id,
            }),
        }
    }

    /// [`resolve`](Self::resolve) plus the session to send through.
    pub async fn resolve_session(
        &self,
        ctx: &TenantContext,
    ) -> Result<(Channel, Arc<ChannelSession>), ZapdeskError> {
        let channel = self.resolve(ctx).await?;
        let session = self
            .session(&channel.id)
            .ok_or(ZapdeskError::NoChannelConnected {
                tenant_id: ctx.tenant_id,
            })?;
        Ok((channel, session))
    }

    /// A specific channel, which must belong to the tenant and be usable.
    pub async fn channel_session(
        &self,
        ctx: &TenantContext,
        channel_id: &str,
    ) -> Result<(Channel, Arc<ChannelSession>), ZapdeskError> {
        let unusable = ZapdeskError::NoChannelConnected {
            tenant_id: ctx.tenant_id,
        };
        let Some(channel) = self.storage.get_channel(channel_id).await? else {
            return Err(unusable);
        };
        if channel.tenant_id != ctx.tenant_id || !channel.is_connected() {
            return Err(unusable);
        }
        match self.session(channel_id) {
            Some(session) => Ok((channel, session)),
            None => Err(unusable),
        }
    }

    /// `preferred` if it is still usable for the tenant, otherwise whatever
    /// [`resolve`](Self::resolve) picks now.
    pub async fn session_for(
        &self,
        ctx: &TenantContext,
        preferred: &str,
    ) -> Result<(Channel, Arc<ChannelSession>), ZapdeskError> {
        match self.channel_session(ctx, preferred).await {
            Ok(found) => Ok(found),
            Err(ZapdeskError::NoChannelConnected { .. }) => {
                debug!(tenant_id = ctx.tenant_id, preferred, "preferred channel unusable, re-resolving");
                self.resolve_session(ctx).await
            }
            Err(e) => Err(e),
        }
    }

    /// Health of every registered driver, ordered by channel id.
    ///
    /// A check that errors or exceeds the verify timeout reports unhealthy.
    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let mut sessions: Vec<Arc<ChannelSession>> =
            self.sessions.iter().map(|s| Arc::clone(s.value())).collect();
        sessions.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));

        let mut report = Vec::with_capacity(sessions.len());
        for session in sessions {
            let status =
                match tokio::time::timeout(session.verify_timeout, session.driver.health_check())
                    .await
                {
                    Ok(Ok(status)) => status,
                    Ok(Err(e)) => HealthStatus::Unhealthy(e.to_string()),
                    Err(_) => HealthStatus::Unhealthy("health check timed out".into()),
                };
            report.push((session.channel_id.clone(), status));
        }
        report
    }

    /// Shuts down every registered driver and empties the table.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<ChannelSession>> =
            self.sessions.iter().map(|s| Arc::clone(s.value())).collect();
        self.sessions.clear();
        for session in sessions {
            if let Err(e) = session.driver.shutdown().await {
                warn!(channel_id = %session.channel_id, error = %e, "driver shutdown failed");
            }
        }
    }
}
