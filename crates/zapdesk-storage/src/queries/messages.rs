// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.

use rusqlite::{OptionalExtension, Row, params};
use zapdesk_core::ZapdeskError;

use crate::database::Database;
use crate::models::Message;

const COLUMNS: &str = "id, tenant_id, ticket_id, contact_id, body, from_me, read, external_id, \
                       quoted_message_id, media_path, media_name, created_at";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        ticket_id: row.get(2)?,
        contact_id: row.get(3)?,
        body: row.get(4)?,
        from_me: row.get(5)?,
        read: row.get(6)?,
        external_id: row.get(7)?,
        quoted_message_id: row.get(8)?,
        media_path: row.get(9)?,
        media_name: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Insert a new message.
pub async fn insert_message(db: &Database, msg: &Message) -> Result<(), ZapdeskError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO messages ({COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    msg.id,
                    msg.tenant_id,
                    msg.ticket_id,
                    msg.contact_id,
                    msg.body,
                    msg.from_me,
                    msg.read,
                    msg.external_id,
                    msg.quoted_message_id,
                    msg.media_path,
                    msg.media_name,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_message(db: &Database, message_id: &str) -> Result<Option<Message>, ZapdeskError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
                params![message_id],
                row_to_message,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// A newest-first window of a ticket's messages, plus the ticket's total.
pub async fn list_messages(
    db: &Database,
    ticket_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Message>, i64), ZapdeskError> {
    let ticket_id = ticket_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE ticket_id = ?1",
                params![ticket_id],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM messages WHERE ticket_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let messages = stmt
                .query_map(params![ticket_id, limit, offset], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((messages, count))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flag a ticket's unread inbound messages as read. Returns exactly the
/// messages that changed, in chronological order.
pub async fn mark_messages_read(db: &Database, ticket_id: &str) -> Result<Vec<Message>, ZapdeskError> {
    let ticket_id = ticket_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut unread = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {COLUMNS} FROM messages
                     WHERE ticket_id = ?1 AND read = 0 AND from_me = 0
                     ORDER BY created_at ASC, rowid ASC"
                ))?;
                stmt.query_map(params![ticket_id], row_to_message)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            tx.execute(
                "UPDATE messages SET read = 1 WHERE ticket_id = ?1 AND read = 0 AND from_me = 0",
                params![ticket_id],
            )?;
            tx.commit()?;
            for msg in &mut unread {
                msg.read = true;
            }
            Ok(unread)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
