// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel driver for deterministic testing.
//!
//! `MockDriver` implements `ChannelDriver` with scriptable reachability,
//! per-file send failures, and captured outbound sends for assertion in
//! tests. It also records how many sends were in flight at once, so tests
//! can prove callers serialize access to a channel.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use zapdesk_core::traits::adapter::PluginAdapter;
use zapdesk_core::traits::channel::ChannelDriver;
use zapdesk_core::types::{AdapterType, HealthStatus, MediaRef, PhonebookEntry, SendAck};
use zapdesk_core::ZapdeskError;

/// One successful call to [`ChannelDriver::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub address: String,
    pub body: String,
    pub file_name: Option<String>,
    pub quoted_external_id: Option<String>,
    pub external_id: String,
}

/// A scriptable channel driver.
///
/// Every number is reachable unless marked otherwise with
/// [`MockDriver::mark_unreachable`]. Verified numbers come back in the
/// network's `<digits>@s.whatsapp.net` form, like a real session would.
pub struct MockDriver {
    name: String,
    unreachable: Mutex<HashSet<String>>,
    failing_files: Mutex<HashSet<String>>,
    fail_all_sends: AtomicBool,
    fail_profile_pics: AtomicBool,
    profile_pics: Mutex<HashMap<String, String>>,
    phonebook: Mutex<Vec<PhonebookEntry>>,
    send_delay: Mutex<Duration>,
    sent: Mutex<Vec<SentMessage>>,
    file_attempts: Mutex<HashMap<String, usize>>,
    send_attempts: AtomicUsize,
    verify_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDriver {
    /// Create a new mock driver with everything reachable and no failures.
    pub fn new() -> Self {
        Self::named("mock-driver")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unreachable: Mutex::new(HashSet::new()),
            failing_files: Mutex::new(HashSet::new()),
            fail_all_sends: AtomicBool::new(false),
            fail_profile_pics: AtomicBool::new(false),
            profile_pics: Mutex::new(HashMap::new()),
            phonebook: Mutex::new(Vec::new()),
            send_delay: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
            file_attempts: Mutex::new(HashMap::new()),
            send_attempts: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make `number` (any formatting) fail verification.
    pub async fn mark_unreachable(&self, number: &str) {
        self.unreachable.lock().await.insert(digits(number));
    }

    /// Every send carrying a media file with this name fails.
    pub async fn fail_file(&self, file_name: &str) {
        self.failing_files.lock().await.insert(file_name.to_string());
    }

    pub fn fail_all_sends(&self, fail: bool) {
        self.fail_all_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profile_pics(&self, fail: bool) {
        self.fail_profile_pics.store(fail, Ordering::SeqCst);
    }

    pub async fn set_profile_pic(&self, address: &str, url: &str) {
        self.profile_pics
            .lock()
            .await
            .insert(address.to_string(), url.to_string());
    }

    pub async fn set_phonebook(&self, entries: Vec<PhonebookEntry>) {
        *self.phonebook.lock().await = entries;
    }

    /// Each send sleeps this long before completing.
    pub async fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().await = delay;
    }

    /// All successful sends, in completion order.
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Send calls for a given media file, successful or not.
    pub async fn attempts_for_file(&self, file_name: &str) -> usize {
        self.file_attempts
            .lock()
            .await
            .get(file_name)
            .copied()
            .unwrap_or(0)
    }

    /// Send calls of any kind, successful or not.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// Highest number of sends observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[async_trait]
impl PluginAdapter for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ZapdeskError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZapdeskError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelDriver for MockDriver {
    async fn verify_number(&self, raw: &str) -> Result<Option<String>, ZapdeskError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let number = digits(raw);
        if number.is_empty() || self.unreachable.lock().await.contains(&number) {
            return Ok(None);
        }
        Ok(Some(format!("{number}@s.whatsapp.net")))
    }

    async fn send(
        &self,
        address: &str,
        body: &str,
        media: Option<&MediaRef>,
        quoted_external_id: Option<&str>,
    ) -> Result<SendAck, ZapdeskError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.send_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let file_name = media.map(|m| m.file_name.clone());
        let failed = match &file_name {
            Some(name) => {
                *self
                    .file_attempts
                    .lock()
                    .await
                    .entry(name.clone())
                    .or_insert(0) += 1;
                self.failing_files.lock().await.contains(name)
            }
            None => false,
        } || self.fail_all_sends.load(Ordering::SeqCst);

        let result = if failed {
            Err(ZapdeskError::send_failed(
                self.name.clone(),
                format!("mock send to {address} rejected"),
            ))
        } else {
            let external_id = format!("mock-{}", uuid::Uuid::new_v4());
            self.sent.lock().await.push(SentMessage {
                address: address.to_string(),
                body: body.to_string(),
                file_name,
                quoted_external_id: quoted_external_id.map(str::to_string),
                external_id: external_id.clone(),
            });
            Ok(SendAck { external_id })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn profile_pic_url(&self, address: &str) -> Result<Option<String>, ZapdeskError> {
        if self.fail_profile_pics.load(Ordering::SeqCst) {
            return Err(ZapdeskError::Internal("profile picture lookup failed".into()));
        }
        Ok(self.profile_pics.lock().await.get(address).cloned())
    }

    async fn fetch_contacts(&self) -> Result<Vec<PhonebookEntry>, ZapdeskError> {
        Ok(self.phonebook.lock().await.clone())
    }
}
