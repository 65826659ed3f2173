// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel rows and user -> channel assignments.

use std::str::FromStr;

use rusqlite::{OptionalExtension, Row, params};
use zapdesk_core::ZapdeskError;

use crate::database::Database;
use crate::models::{Channel, ChannelStatus};

const COLUMNS: &str = "c.id, c.tenant_id, c.name, c.status, c.is_default, c.created_at, c.updated_at";

fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let status: String = row.get(3)?;
    let status = ChannelStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Channel {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        status,
        is_default: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Insert or update a channel. Marking it default clears the tenant's
/// previous default in the same transaction.
pub async fn upsert_channel(db: &Database, channel: &Channel) -> Result<(), ZapdeskError> {
    let channel = channel.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            if channel.is_default {
                tx.execute(
                    "UPDATE channels SET is_default = 0,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE tenant_id = ?1 AND id != ?2 AND is_default = 1",
                    params![channel.tenant_id, channel.id],
                )?;
            }
            tx.execute(
                "INSERT INTO channels (id, tenant_id, name, status, is_default, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    status = excluded.status,
                    is_default = excluded.is_default,
                    updated_at = excluded.updated_at",
                params![
                    channel.id,
                    channel.tenant_id,
                    channel.name,
                    channel.status.to_string(),
                    channel.is_default,
                    channel.created_at,
                    channel.updated_at,
                ],
            )?;
            tx.commit()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a connectivity change reported by a driver.
pub async fn set_channel_status(
    db: &Database,
    channel_id: &str,
    status: ChannelStatus,
) -> Result<(), ZapdeskError> {
    let channel_id = channel_id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE channels SET status = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![status, channel_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_channel(db: &Database, channel_id: &str) -> Result<Option<Channel>, ZapdeskError> {
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM channels c WHERE c.id = ?1"),
                params![channel_id],
                row_to_channel,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All channels of a tenant: default first, then oldest first.
pub async fn list_channels(db: &Database, tenant_id: i64) -> Result<Vec<Channel>, ZapdeskError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM channels c WHERE c.tenant_id = ?1
                 ORDER BY c.is_default DESC, c.created_at ASC, c.id ASC"
            ))?;
            let rows = stmt.query_map(params![tenant_id], row_to_channel)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn assign_user_channel(
    db: &Database,
    user_id: i64,
    tenant_id: i64,
    channel_id: &str,
) -> Result<(), ZapdeskError> {
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO user_channels (user_id, tenant_id, channel_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                    tenant_id = excluded.tenant_id,
                    channel_id = excluded.channel_id",
                params![user_id, tenant_id, channel_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_user_channel(db: &Database, user_id: i64) -> Result<Option<Channel>, ZapdeskError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM channels c
                     JOIN user_channels u ON u.channel_id = c.id
                     WHERE u.user_id = ?1 AND u.tenant_id = c.tenant_id"
                ),
                params![user_id],
                row_to_channel,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
