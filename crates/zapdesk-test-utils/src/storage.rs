// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temporary SQLite storage and seed rows.

use std::sync::Arc;

use zapdesk_config::model::StorageConfig;
use zapdesk_core::types::{Channel, ChannelStatus, now_timestamp};
use zapdesk_core::{StorageAdapter, ZapdeskError};
use zapdesk_storage::SqliteStorage;

/// Opens a migrated SQLite store in a fresh temp directory.
///
/// Keep the returned `TempDir` alive for as long as the storage is used.
pub async fn temp_storage()
-> Result<(Arc<dyn StorageAdapter + Send + Sync>, tempfile::TempDir), ZapdeskError> {
    let temp_dir =
        tempfile::TempDir::new().map_err(|e| ZapdeskError::Storage { source: e.into() })?;
    let db_path = temp_dir.path().join("test.db");
    let storage = SqliteStorage::new(StorageConfig {
        database_path: db_path.to_string_lossy().to_string(),
        wal_mode: true,
    });
    storage.initialize().await?;
    Ok((Arc::new(storage), temp_dir))
}

/// A connected channel row.
pub fn channel(id: &str, tenant_id: i64, is_default: bool) -> Channel {
    let now = now_timestamp();
    Channel {
        id: id.to_string(),
        tenant_id,
        name: format!("{id} line"),
        status: ChannelStatus::Connected,
        is_default,
        created_at: now.clone(),
        updated_at: now,
    }
}
