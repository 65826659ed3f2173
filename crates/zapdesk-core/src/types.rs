// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by every Zapdesk crate.
//!
//! Records (`Channel`, `Contact`, `Ticket`, `Message`) serialize in camelCase
//! because they are published verbatim as event payloads.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ZapdeskError;

/// Current UTC time as an ISO-8601 string with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Generates a new entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Storage,
}

/// Tenant/session context supplied with every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: i64,
    pub user_id: Option<i64>,
}

impl TenantContext {
    pub fn new(tenant_id: i64) -> Self {
        Self {
            tenant_id,
            user_id: None,
        }
    }

    pub fn with_user(tenant_id: i64, user_id: i64) -> Self {
        Self {
            tenant_id,
            user_id: Some(user_id),
        }
    }
}

// --- Channels ---

/// Connectivity of a channel session, as last reported by its driver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// One external messaging session usable by a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub tenant_id: i64,
    pub name: String,
    pub status: ChannelStatus,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Channel {
    pub fn is_connected(&self) -> bool {
        self.status == ChannelStatus::Connected
    }
}

/// Acknowledgement returned by a driver after a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    /// Identifier assigned by the external network.
    pub external_id: String,
}

/// A phonebook entry pulled from a channel session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhonebookEntry {
    pub name: String,
    pub number: String,
}

// --- Contacts ---

/// Normalized, digits-only external address. The dedup key for contacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalAddress(String);

impl CanonicalAddress {
    /// Strips every non-digit character. Returns `None` when nothing is left.
    pub fn normalize(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            Some(Self(digits))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub tenant_id: i64,
    pub address: String,
    pub name: String,
    pub profile_pic_url: Option<String>,
    pub is_group: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Input to contact resolution.
///
/// `name: None` keeps an existing contact's name and falls back to the
/// address for a new one. `profile_pic_url: None` keeps the stored picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub tenant_id: i64,
    pub address: CanonicalAddress,
    pub name: Option<String>,
    pub profile_pic_url: Option<String>,
    pub is_group: bool,
}

/// Filter for listing a tenant's contacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFilter {
    pub tenant_id: i64,
    /// Case-insensitive substring match on the name.
    pub name: Option<String>,
    /// Inclusive lower bound on `created_at`; only applied with `created_to`.
    pub created_from: Option<String>,
    /// Inclusive upper bound on `created_at`; only applied with `created_from`.
    pub created_to: Option<String>,
}

/// Result of creating or updating a contact in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactWrite {
    Created(Contact),
    Updated(Contact),
    /// A row with the same (tenant, address) appeared between lookup and insert.
    Conflict,
}

// --- Tickets ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Open,
    Closed,
}

impl TicketStatus {
    /// Pending and open tickets are "active": eligible for new messages.
    pub fn is_active(self) -> bool {
        matches!(self, TicketStatus::Pending | TicketStatus::Open)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub tenant_id: i64,
    pub contact_id: String,
    pub channel_id: String,
    pub status: TicketStatus,
    pub last_message: String,
    pub user_id: Option<i64>,
    pub queue_id: Option<i64>,
    /// Bumped on every write; used for compare-and-swap updates.
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Input to the atomic find-or-create of an active ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub tenant_id: i64,
    pub contact_id: String,
    pub channel_id: String,
    /// Status used only if a ticket has to be created.
    pub status: TicketStatus,
    pub queue_id: Option<i64>,
}

/// Ticket fields a conditional transition requires to be unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketGuard {
    pub status: TicketStatus,
    pub user_id: Option<i64>,
    pub queue_id: Option<i64>,
}

impl TicketGuard {
    /// Guards on the ticket exactly as it is now.
    pub fn of(ticket: &Ticket) -> Self {
        Self {
            status: ticket.status,
            user_id: ticket.user_id,
            queue_id: ticket.queue_id,
        }
    }
}

/// Partial update applied by `TicketLifecycleManager::update`.
///
/// Double options distinguish "leave unchanged" (`None`) from "clear"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketPatch {
    pub status: Option<TicketStatus>,
    pub user_id: Option<Option<i64>>,
    pub queue_id: Option<Option<i64>>,
    pub last_message: Option<String>,
}

impl TicketPatch {
    pub fn status(status: TicketStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn last_message(body: impl Into<String>) -> Self {
        Self {
            last_message: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.user_id.is_none()
            && self.queue_id.is_none()
            && self.last_message.is_none()
    }

    /// True when the patch changes who owns the ticket or its state.
    pub fn touches_lifecycle(&self) -> bool {
        self.status.is_some() || self.user_id.is_some()
    }

    /// Returns `ticket` with the patch applied (version untouched).
    pub fn apply(&self, ticket: &Ticket) -> Ticket {
        let mut next = ticket.clone();
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(user_id) = self.user_id {
            next.user_id = user_id;
        }
        if let Some(queue_id) = self.queue_id {
            next.queue_id = queue_id;
        }
        if let Some(ref body) = self.last_message {
            next.last_message = body.clone();
        }
        next
    }
}

// --- Messages ---

/// A media attachment already stored on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub path: String,
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Per-attachment caption; overrides the request body for this file.
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub tenant_id: i64,
    pub ticket_id: String,
    pub contact_id: String,
    pub body: String,
    pub from_me: bool,
    pub read: bool,
    pub external_id: Option<String>,
    pub quoted_message_id: Option<String>,
    pub media_path: Option<String>,
    pub media_name: Option<String>,
    pub created_at: String,
}

/// One page of a ticket's history, in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub count: i64,
    pub has_more: bool,
}

/// An outbound request, resolved once at the dispatcher boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRequest {
    Text {
        body: String,
        quoted_id: Option<String>,
    },
    Media {
        attachments: Vec<MediaRef>,
        body: Option<String>,
    },
}

impl MessageRequest {
    /// Builds a request from loosely-typed inputs.
    ///
    /// Attachments win over text; a request with neither a non-blank body nor
    /// attachments is rejected.
    pub fn from_parts(
        body: Option<String>,
        attachments: Vec<MediaRef>,
        quoted_id: Option<String>,
    ) -> Result<Self, ZapdeskError> {
        let body = body.filter(|b| !b.trim().is_empty());
        if !attachments.is_empty() {
            if let Some(bad) = attachments.iter().find(|m| m.path.trim().is_empty()) {
                return Err(ZapdeskError::Validation(format!(
                    "attachment `{}` has no path",
                    bad.file_name
                )));
            }
            return Ok(Self::Media { attachments, body });
        }
        match body {
            Some(body) => Ok(Self::Text { body, quoted_id }),
            None => Err(ZapdeskError::Validation(
                "a message body or at least one attachment is required".into(),
            )),
        }
    }

    /// Re-checks the invariants `from_parts` enforces, for hand-built values.
    pub fn validate(&self) -> Result<(), ZapdeskError> {
        match self {
            Self::Text { body, .. } if body.trim().is_empty() => Err(ZapdeskError::Validation(
                "a message body is required".into(),
            )),
            Self::Media { attachments, .. } if attachments.is_empty() => Err(
                ZapdeskError::Validation("at least one attachment is required".into()),
            ),
            Self::Media { attachments, .. } => {
                match attachments.iter().find(|m| m.path.trim().is_empty()) {
                    Some(bad) => Err(ZapdeskError::Validation(format!(
                        "attachment `{}` has no path",
                        bad.file_name
                    ))),
                    None => Ok(()),
                }
            }
            Self::Text { .. } => Ok(()),
        }
    }
}

// --- Dispatch jobs ---

/// Wire payload of an asynchronous media send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    pub channel_id: String,
    pub tenant_id: i64,
    pub ticket_id: String,
    pub attempts_max: u32,
    pub remove_on_complete: bool,
    pub data: DispatchPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    pub address: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl DispatchPayload {
    /// The media attachment carried by this payload, if any.
    pub fn media(&self) -> Option<MediaRef> {
        self.media_path.as_ref().map(|path| MediaRef {
            path: path.clone(),
            file_name: self.file_name.clone().unwrap_or_default(),
            mime_type: self.mime_type.clone(),
            caption: None,
        })
    }
}

/// Handle returned by `JobQueue::enqueue`. Completion is observed on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: i64,
}

/// A durable job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub available_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobFailure {
    pub attempts: u32,
    pub exhausted: bool,
}

// --- Events ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Message,
    Ticket,
    Contact,
    /// Only used for terminal dispatch-job failures.
    Job,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

/// Counts produced by a bulk contact import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(name: &str) -> MediaRef {
        MediaRef {
            path: format!("/tmp/{name}"),
            file_name: name.to_string(),
            mime_type: None,
            caption: None,
        }
    }

    #[test]
    fn canonical_address_strips_formatting() {
        let addr = CanonicalAddress::normalize("+1 (555) 123-4567").unwrap();
        assert_eq!(addr.as_str(), "15551234567");
        assert!(addr.as_str().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn canonical_address_strips_jid_suffix() {
        let addr = CanonicalAddress::normalize("5511999990000@s.whatsapp.net").unwrap();
        assert_eq!(addr.as_str(), "5511999990000");
    }

    #[test]
    fn canonical_address_rejects_digitless_input() {
        assert!(CanonicalAddress::normalize("").is_none());
        assert!(CanonicalAddress::normalize("call me").is_none());
    }

    #[test]
    fn empty_request_is_rejected() {
        let err = MessageRequest::from_parts(Some("   ".into()), vec![], None).unwrap_err();
        assert!(matches!(err, ZapdeskError::Validation(_)));
        let err = MessageRequest::from_parts(None, vec![], None).unwrap_err();
        assert!(matches!(err, ZapdeskError::Validation(_)));
    }

    #[test]
    fn attachments_take_precedence_over_text() {
        let req =
            MessageRequest::from_parts(Some("hi".into()), vec![media("a.png")], None).unwrap();
        match req {
            MessageRequest::Media { attachments, body } => {
                assert_eq!(attachments.len(), 1);
                assert_eq!(body.as_deref(), Some("hi"));
            }
            other => panic!("expected media request, got {other:?}"),
        }
    }

    #[test]
    fn attachment_without_path_is_rejected() {
        let mut bad = media("a.png");
        bad.path = String::new();
        assert!(MessageRequest::from_parts(None, vec![bad], None).is_err());
    }

    #[test]
    fn ticket_status_activity() {
        assert!(TicketStatus::Pending.is_active());
        assert!(TicketStatus::Open.is_active());
        assert!(!TicketStatus::Closed.is_active());
        assert_eq!(TicketStatus::Open.to_string(), "open");
        assert_eq!("closed".parse::<TicketStatus>().unwrap(), TicketStatus::Closed);
    }

    #[test]
    fn dispatch_job_wire_shape() {
        let job = DispatchJob {
            channel_id: "ch-1".into(),
            tenant_id: 7,
            ticket_id: "t-1".into(),
            attempts_max: 3,
            remove_on_complete: true,
            data: DispatchPayload {
                address: "15551234567".into(),
                body: "photo.png".into(),
                media_path: Some("/tmp/photo.png".into()),
                file_name: Some("photo.png".into()),
                mime_type: None,
            },
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["channelId"], "ch-1");
        assert_eq!(json["attemptsMax"], 3);
        assert_eq!(json["removeOnComplete"], true);
        assert_eq!(json["data"]["mediaPath"], "/tmp/photo.png");
        assert!(json["data"].get("mimeType").is_none());
    }

    #[test]
    fn patch_apply_distinguishes_clear_from_keep() {
        let ticket = Ticket {
            id: "t".into(),
            tenant_id: 1,
            contact_id: "c".into(),
            channel_id: "ch".into(),
            status: TicketStatus::Open,
            last_message: String::new(),
            user_id: Some(4),
            queue_id: Some(2),
            version: 1,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        };
        let patch = TicketPatch {
            user_id: Some(None),
            ..TicketPatch::default()
        };
        let next = patch.apply(&ticket);
        assert_eq!(next.user_id, None);
        assert_eq!(next.queue_id, Some(2));
        assert!(patch.touches_lifecycle());
        assert!(!TicketPatch::last_message("x").touches_lifecycle());
    }
}
