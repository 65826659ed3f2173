// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket operations.
//!
//! The partial unique index `idx_tickets_active` allows at most one pending or
//! open ticket per (contact, channel). Updates are compare-and-swap on
//! `version`.

use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, params};
use zapdesk_core::ZapdeskError;
use zapdesk_core::types::{new_id, now_timestamp};

use crate::database::{Database, is_constraint_violation};
use crate::models::{NewTicket, Ticket, TicketGuard, TicketStatus};

const COLUMNS: &str = "id, tenant_id, contact_id, channel_id, status, last_message, user_id, \
                       queue_id, version, created_at, updated_at";

fn row_to_ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let status: String = row.get(4)?;
    let status = TicketStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Ticket {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        contact_id: row.get(2)?,
        channel_id: row.get(3)?,
        status,
        last_message: row.get(5)?,
        user_id: row.get(6)?,
        queue_id: row.get(7)?,
        version: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn select_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Ticket>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM tickets WHERE id = ?1"),
        params![id],
        row_to_ticket,
    )
    .optional()
}

fn select_active(
    conn: &Connection,
    contact_id: &str,
    channel_id: &str,
) -> rusqlite::Result<Option<Ticket>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM tickets
             WHERE contact_id = ?1 AND channel_id = ?2 AND status IN ('pending', 'open')"
        ),
        params![contact_id, channel_id],
        row_to_ticket,
    )
    .optional()
}

pub async fn get_ticket(db: &Database, ticket_id: &str) -> Result<Option<Ticket>, ZapdeskError> {
    let ticket_id = ticket_id.to_string();
    db.connection()
        .call(move |conn| select_by_id(conn, &ticket_id))
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_active_ticket(
    db: &Database,
    contact_id: &str,
    channel_id: &str,
) -> Result<Option<Ticket>, ZapdeskError> {
    let contact_id = contact_id.to_string();
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| select_active(conn, &contact_id, &channel_id))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return the active ticket for the pair, creating one if there is none.
///
/// Lookup and insert run in one transaction on the writer thread, so two
/// callers can never both insert.
pub async fn find_or_create_ticket(
    db: &Database,
    new: &NewTicket,
) -> Result<(Ticket, bool), ZapdeskError> {
    let new = new.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            if let Some(existing) = select_active(&tx, &new.contact_id, &new.channel_id)? {
                tx.commit()?;
                return Ok((existing, false));
            }
            let now = now_timestamp();
            let ticket = Ticket {
                id: new_id(),
                tenant_id: new.tenant_id,
                contact_id: new.contact_id,
                channel_id: new.channel_id,
                status: new.status,
                last_message: String::new(),
                user_id: None,
                queue_id: new.queue_id,
                version: 1,
                created_at: now.clone(),
                updated_at: now,
            };
            tx.execute(
                "INSERT INTO tickets (id, tenant_id, contact_id, channel_id, status, last_message,
                                      user_id, queue_id, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    ticket.id,
                    ticket.tenant_id,
                    ticket.contact_id,
                    ticket.channel_id,
                    ticket.status.to_string(),
                    ticket.last_message,
                    ticket.user_id,
                    ticket.queue_id,
                    ticket.version,
                    ticket.created_at,
                    ticket.updated_at,
                ],
            )?;
            tx.commit()?;
            Ok((ticket, true))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

enum CasOutcome {
    Written(Option<Ticket>),
    Stale,
    Duplicate,
}

/// Write every mutable column of `ticket` if the stored version still matches.
///
/// Returns `Ok(None)` when the version moved on. Re-activating a ticket while
/// another one is active for the same pair is a [`ZapdeskError::Conflict`].
pub async fn update_ticket_if_version(
    db: &Database,
    ticket: &Ticket,
) -> Result<Option<Ticket>, ZapdeskError> {
    let ticket = ticket.clone();
    let ticket_id = ticket.id.clone();
    let outcome = db
        .connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tickets SET
                    status = ?1, last_message = ?2, user_id = ?3, queue_id = ?4,
                    version = version + 1,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?5 AND version = ?6",
                params![
                    ticket.status.to_string(),
                    ticket.last_message,
                    ticket.user_id,
                    ticket.queue_id,
                    ticket.id,
                    ticket.version,
                ],
            );
            match changed {
                Ok(0) => Ok(CasOutcome::Stale),
                Ok(_) => Ok(CasOutcome::Written(select_by_id(conn, &ticket.id)?)),
                Err(e) if is_constraint_violation(&e) => Ok(CasOutcome::Duplicate),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    match outcome {
        CasOutcome::Written(ticket) => Ok(ticket),
        CasOutcome::Stale => Ok(None),
        CasOutcome::Duplicate => Err(ZapdeskError::Conflict(format!(
            "another active ticket exists for the contact and channel of {ticket_id}"
        ))),
    }
}

/// Move a ticket to `to`; `None` if its status, user or queue no longer
/// match `guard`.
pub async fn transition_ticket_if(
    db: &Database,
    ticket_id: &str,
    guard: TicketGuard,
    to: TicketStatus,
) -> Result<Option<Ticket>, ZapdeskError> {
    let ticket_id = ticket_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tickets SET status = ?1, version = version + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND status = ?3 AND user_id IS ?4 AND queue_id IS ?5",
                params![
                    to.to_string(),
                    ticket_id,
                    guard.status.to_string(),
                    guard.user_id,
                    guard.queue_id
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            select_by_id(conn, &ticket_id)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
