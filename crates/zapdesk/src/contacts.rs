// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapdesk contacts` command implementation.

use std::sync::Arc;

use zapdesk_config::model::ZapdeskConfig;
use zapdesk_core::types::{Contact, ContactFilter};
use zapdesk_core::{StorageAdapter, ZapdeskError};
use zapdesk_dispatch::DispatchService;
use zapdesk_storage::SqliteStorage;

/// Prints the tenant's contacts matching `filter` as a JSON array.
pub async fn run_contacts(config: &ZapdeskConfig, filter: &ContactFilter) -> Result<(), ZapdeskError> {
    let contacts = list_contacts(config, filter).await?;
    let json = serde_json::to_string_pretty(&contacts)
        .map_err(|e| ZapdeskError::Internal(format!("contacts not serializable: {e}")))?;
    println!("{json}");
    Ok(())
}

async fn list_contacts(
    config: &ZapdeskConfig,
    filter: &ContactFilter,
) -> Result<Vec<Contact>, ZapdeskError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let storage: Arc<dyn StorageAdapter + Send + Sync> = Arc::new(storage);

    let service = DispatchService::new(config, Arc::clone(&storage));
    let contacts = service.contacts.list(filter).await;
    storage.close().await?;
    contacts
}
