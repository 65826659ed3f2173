// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact resolution, listing, and phonebook import.
//!
//! Contacts are keyed by (tenant, canonical address). Resolution is a
//! lookup followed by an insert; a uniqueness violation on the insert means
//! another request created the contact first, so the row is re-fetched and
//! treated as found.

use std::sync::Arc;

use tracing::{debug, info};

use zapdesk_bus::EventBus;
use zapdesk_core::types::{
    CanonicalAddress, Contact, ContactFilter, ContactWrite, EntityKind, EventAction,
    ImportReport, NewContact, PhonebookEntry,
};
use zapdesk_core::{StorageAdapter, ZapdeskError};

use crate::registry::ChannelSession;

/// What a resolution did to the stored contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Created,
    Updated,
    Unchanged,
}

/// Mutable details supplied with a resolution.
///
/// `None` fields never overwrite stored values. A new contact without a
/// name is named after its address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDetails {
    pub name: Option<String>,
    pub profile_pic_url: Option<String>,
    pub is_group: bool,
}

impl ContactDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

pub struct ContactResolver {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    bus: Arc<EventBus>,
}

impl ContactResolver {
    pub fn new(storage: Arc<dyn StorageAdapter + Send + Sync>, bus: Arc<EventBus>) -> Self {
        Self { storage, bus }
    }

    /// Returns the tenant's contact for `address`, creating it if needed.
    pub async fn resolve_or_create(
        &self,
        tenant_id: i64,
        address: &CanonicalAddress,
        details: &ContactDetails,
    ) -> Result<Contact, ZapdeskError> {
        self.resolve(tenant_id, address, details)
            .await
            .map(|(contact, _)| contact)
    }

    async fn resolve(
        &self,
        tenant_id: i64,
        address: &CanonicalAddress,
        details: &ContactDetails,
    ) -> Result<(Contact, Resolution), ZapdeskError> {
        if let Some(existing) = self.storage.find_contact(tenant_id, address.as_str()).await? {
            return self.refresh(existing, details).await;
        }

        let new = NewContact {
            tenant_id,
            address: address.clone(),
            name: details.name.clone(),
            profile_pic_url: details.profile_pic_url.clone(),
            is_group: details.is_group,
        };
        match self.storage.insert_contact(&new).await? {
            ContactWrite::Created(contact) => {
                info!(tenant_id, contact_id = %contact.id, address = %address, "contact created");
                self.bus
                    .publish_record(tenant_id, EntityKind::Contact, EventAction::Create, &contact);
                Ok((contact, Resolution::Created))
            }
            ContactWrite::Updated(contact) => Ok((contact, Resolution::Updated)),
            ContactWrite::Conflict => {
                debug!(tenant_id, address = %address, "contact created concurrently, re-fetching");
                let existing = self
                    .storage
                    .find_contact(tenant_id, address.as_str())
                    .await?
                    .ok_or_else(|| {
                        ZapdeskError::Internal(format!(
                            "contact {address} vanished after a uniqueness conflict"
                        ))
                    })?;
                self.refresh(existing, details).await
            }
        }
    }

    async fn refresh(
        &self,
        existing: Contact,
        details: &ContactDetails,
    ) -> Result<(Contact, Resolution), ZapdeskError> {
        let name = details
            .name
            .as_deref()
            .filter(|n| *n != existing.name.as_str());
        let pic = details
            .profile_pic_url
            .as_deref()
            .filter(|p| Some(*p) != existing.profile_pic_url.as_deref());
        if name.is_none() && pic.is_none() {
            return Ok((existing, Resolution::Unchanged));
        }

        let updated = self
            .storage
            .update_contact(&existing.id, name, pic)
            .await?
            .ok_or_else(|| ZapdeskError::ContactNotFound {
                contact_id: existing.id.clone(),
            })?;
        debug!(contact_id = %updated.id, "contact details refreshed");
        self.bus.publish_record(
            updated.tenant_id,
            EntityKind::Contact,
            EventAction::Update,
            &updated,
        );
        Ok((updated, Resolution::Updated))
    }

    /// Read-only lookup by canonical address.
    pub async fn find(
        &self,
        tenant_id: i64,
        address: &CanonicalAddress,
    ) -> Result<Option<Contact>, ZapdeskError> {
        self.storage.find_contact(tenant_id, address.as_str()).await
    }

    /// Loads a contact, hiding other tenants' rows.
    pub async fn get(&self, tenant_id: i64, contact_id: &str) -> Result<Contact, ZapdeskError> {
        match self.storage.get_contact(contact_id).await? {
            Some(contact) if contact.tenant_id == tenant_id => Ok(contact),
            _ => Err(ZapdeskError::ContactNotFound {
                contact_id: contact_id.to_string(),
            }),
        }
    }

    pub async fn list(&self, filter: &ContactFilter) -> Result<Vec<Contact>, ZapdeskError> {
        self.storage.list_contacts(filter).await
    }

    /// Bulk-resolves phonebook entries. Entries without digits are skipped.
    pub async fn import(
        &self,
        tenant_id: i64,
        entries: Vec<PhonebookEntry>,
    ) -> Result<ImportReport, ZapdeskError> {
        if entries.is_empty() {
            return Err(ZapdeskError::Validation(
                "at least one contact is required".into(),
            ));
        }
        self.import_entries(tenant_id, entries).await
    }

    /// Imports the channel session's own phonebook.
    pub async fn import_from_channel(
        &self,
        tenant_id: i64,
        session: &ChannelSession,
    ) -> Result<ImportReport, ZapdeskError> {
        let entries = session.fetch_contacts().await?;
        info!(tenant_id, channel_id = session.channel_id(), count = entries.len(), "importing phonebook");
        self.import_entries(tenant_id, entries).await
    }

    async fn import_entries(
        &self,
        tenant_id: i64,
        entries: Vec<PhonebookEntry>,
    ) -> Result<ImportReport, ZapdeskError> {
        let mut report = ImportReport::default();
        for entry in entries {
            let Some(address) = CanonicalAddress::normalize(&entry.number) else {
                debug!(number = %entry.number, "skipping entry without digits");
                report.skipped += 1;
                continue;
            };
            let name = entry.name.trim();
            let details = ContactDetails {
                name: (!name.is_empty()).then(|| name.to_string()),
                ..ContactDetails::default()
            };
            match self.resolve(tenant_id, &address, &details).await?.1 {
                Resolution::Created => report.created += 1,
                Resolution::Updated => report.updated += 1,
                Resolution::Unchanged => report.unchanged += 1,
            }
        }
        info!(
            tenant_id,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "contact import finished"
        );
        Ok(report)
    }
}
