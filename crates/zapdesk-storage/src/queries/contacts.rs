// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact CRUD operations. `(tenant_id, address)` is unique.

use rusqlite::{OptionalExtension, Row, params};
use zapdesk_core::ZapdeskError;
use zapdesk_core::types::{new_id, now_timestamp};

use crate::database::{Database, is_constraint_violation};
use crate::models::{Contact, ContactFilter, ContactWrite, NewContact};

const COLUMNS: &str =
    "id, tenant_id, address, name, profile_pic_url, is_group, created_at, updated_at";

fn row_to_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        address: row.get(2)?,
        name: row.get(3)?,
        profile_pic_url: row.get(4)?,
        is_group: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub async fn get_contact(db: &Database, contact_id: &str) -> Result<Option<Contact>, ZapdeskError> {
    let contact_id = contact_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM contacts WHERE id = ?1"),
                params![contact_id],
                row_to_contact,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_contact(
    db: &Database,
    tenant_id: i64,
    address: &str,
) -> Result<Option<Contact>, ZapdeskError> {
    let address = address.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM contacts WHERE tenant_id = ?1 AND address = ?2"),
                params![tenant_id, address],
                row_to_contact,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a new contact.
///
/// A duplicate `(tenant_id, address)` yields [`ContactWrite::Conflict`] so the
/// caller can re-read the winning row.
pub async fn insert_contact(db: &Database, new: &NewContact) -> Result<ContactWrite, ZapdeskError> {
    let now = now_timestamp();
    let contact = Contact {
        id: new_id(),
        tenant_id: new.tenant_id,
        address: new.address.as_str().to_string(),
        name: new
            .name
            .clone()
            .unwrap_or_else(|| new.address.as_str().to_string()),
        profile_pic_url: new.profile_pic_url.clone(),
        is_group: new.is_group,
        created_at: now.clone(),
        updated_at: now,
    };
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO contacts (id, tenant_id, address, name, profile_pic_url, is_group,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    contact.id,
                    contact.tenant_id,
                    contact.address,
                    contact.name,
                    contact.profile_pic_url,
                    contact.is_group,
                    contact.created_at,
                    contact.updated_at,
                ],
            );
            match inserted {
                Ok(_) => Ok(ContactWrite::Created(contact)),
                Err(e) if is_constraint_violation(&e) => Ok(ContactWrite::Conflict),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update name and/or picture. `None` keeps the stored value.
pub async fn update_contact(
    db: &Database,
    contact_id: &str,
    name: Option<&str>,
    profile_pic_url: Option<&str>,
) -> Result<Option<Contact>, ZapdeskError> {
    let contact_id = contact_id.to_string();
    let name = name.map(str::to_string);
    let profile_pic_url = profile_pic_url.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE contacts SET
                    name = COALESCE(?2, name),
                    profile_pic_url = COALESCE(?3, profile_pic_url),
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![contact_id, name, profile_pic_url],
            )?;
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM contacts WHERE id = ?1"),
                params![contact_id],
                row_to_contact,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Widens a bare `YYYY-MM-DD` upper bound to the end of that day.
fn end_of_day(bound: &str) -> String {
    if bound.len() == 10 {
        format!("{bound}T23:59:59.999Z")
    } else {
        bound.to_string()
    }
}

/// List a tenant's contacts ordered by name.
///
/// The name filter is a case-insensitive substring match. The date range is
/// applied only when both bounds are present.
pub async fn list_contacts(db: &Database, filter: &ContactFilter) -> Result<Vec<Contact>, ZapdeskError> {
    let tenant_id = filter.tenant_id;
    let name = filter
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| n.to_lowercase());
    let range = match (&filter.created_from, &filter.created_to) {
        (Some(from), Some(to)) => Some((from.clone(), end_of_day(to))),
        _ => None,
    };
    let (from, to) = range.unzip();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM contacts
                 WHERE tenant_id = ?1
                   AND (?2 IS NULL OR lower(name) LIKE '%' || ?2 || '%')
                   AND (?3 IS NULL OR created_at BETWEEN ?3 AND ?4)
                 ORDER BY name ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![tenant_id, name, from, to], row_to_contact)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
