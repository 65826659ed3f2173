// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue operations.
//!
//! `attempts` counts failed executions. A job becomes due when
//! `available_at` has passed; a failed job is pushed back by its retry delay.

use std::time::Duration;

use rusqlite::{Row, params};
use zapdesk_core::ZapdeskError;

use crate::database::Database;
use crate::models::{JobFailure, QueueEntry};

const COLUMNS: &str = "id, queue_name, payload, status, attempts, max_attempts, available_at, \
                       created_at, updated_at, locked_until";

/// SQLite datetime modifier for an offset from now.
fn offset_modifier(delay: Duration) -> String {
    format!("+{:.3} seconds", delay.as_secs_f64())
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.get(0)?,
        queue_name: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        available_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        locked_until: row.get(9)?,
    })
}

/// Enqueue a new job. Returns the auto-generated job id.
pub async fn enqueue(
    db: &Database,
    queue_name: &str,
    payload: &str,
    max_attempts: u32,
) -> Result<i64, ZapdeskError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO jobs (queue_name, payload, max_attempts) VALUES (?1, ?2, ?3)",
                params![queue_name, payload, max_attempts],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Dequeue the oldest due pending job from the named queue.
///
/// Atomically selects it and marks it "processing" with a lock that expires
/// after `lock_timeout`. Returns `None` if nothing is due.
pub async fn dequeue(
    db: &Database,
    queue_name: &str,
    lock_timeout: Duration,
) -> Result<Option<QueueEntry>, ZapdeskError> {
    let queue_name = queue_name.to_string();
    let lock = offset_modifier(lock_timeout);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {COLUMNS} FROM jobs
                     WHERE queue_name = ?1 AND status = 'pending'
                       AND available_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     ORDER BY available_at ASC, id ASC
                     LIMIT 1"
                ))?;
                stmt.query_row(params![queue_name], row_to_entry)
            };

            match result {
                Ok(entry) => {
                    let locked_until: String = tx.query_row(
                        "UPDATE jobs SET status = 'processing',
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1
                         RETURNING locked_until",
                        params![entry.id, lock],
                        |row| row.get(0),
                    )?;
                    tx.commit()?;

                    Ok(Some(QueueEntry {
                        status: "processing".to_string(),
                        locked_until: Some(locked_until),
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Acknowledge a successful job. The row is deleted when `remove` is set,
/// otherwise it is kept as "completed".
pub async fn complete(db: &Database, id: i64, remove: bool) -> Result<(), ZapdeskError> {
    db.connection()
        .call(move |conn| {
            if remove {
                conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
            } else {
                conn.execute(
                    "UPDATE jobs SET status = 'completed', locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![id],
                )?;
            }
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed attempt.
///
/// Increments attempts. If attempts >= max_attempts, sets status to "failed".
/// Otherwise the job goes back to "pending", due again after `retry_delay`.
pub async fn fail(db: &Database, id: i64, retry_delay: Duration) -> Result<JobFailure, ZapdeskError> {
    let delay = offset_modifier(retry_delay);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let (attempts, max_attempts): (u32, u32) = tx.query_row(
                "SELECT attempts, max_attempts FROM jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let attempts = attempts + 1;
            let exhausted = attempts >= max_attempts;
            if exhausted {
                tx.execute(
                    "UPDATE jobs SET status = 'failed', attempts = ?1,
                     locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![attempts, id],
                )?;
            } else {
                tx.execute(
                    "UPDATE jobs SET status = 'pending', attempts = ?1,
                     locked_until = NULL,
                     available_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?3),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![attempts, id, delay],
                )?;
            }
            tx.commit()?;
            Ok(JobFailure {
                attempts,
                exhausted,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn remove(db: &Database, id: i64) -> Result<(), ZapdeskError> {
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return "processing" jobs whose lock has expired to "pending".
///
/// A worker that crashed mid-job leaves its row locked; this makes it due
/// again without counting an attempt.
pub async fn requeue_stale(db: &Database, queue_name: &str) -> Result<usize, ZapdeskError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE jobs SET status = 'pending', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE queue_name = ?1 AND status = 'processing'
                   AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![queue_name],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Jobs still waiting or in flight.
pub async fn count_open(db: &Database, queue_name: &str) -> Result<i64, ZapdeskError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM jobs
                 WHERE queue_name = ?1 AND status IN ('pending', 'processing')",
                params![queue_name],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::channels::tests::setup_db;

    const LOCK: Duration = Duration::from_secs(300);

    async fn status_of(db: &Database, id: i64) -> Option<(String, u32)> {
        db.connection()
            .call(move |conn| -> Result<Option<(String, u32)>, rusqlite::Error> {
                use rusqlite::OptionalExtension;
                conn.query_row(
                    "SELECT status, attempts FROM jobs WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn enqueue_and_dequeue_lifecycle() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "media", r#"{"n":1}"#, 3).await.unwrap();
        assert!(id > 0);

        let entry = dequeue(&db, "media", LOCK).await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, "processing");
        assert_eq!(entry.payload, r#"{"n":1}"#);
        assert!(entry.locked_until.is_some());

        assert!(dequeue(&db, "media", LOCK).await.unwrap().is_none());
        assert!(dequeue(&db, "other", LOCK).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn complete_with_remove_deletes_row() {
        let (db, _dir) = setup_db().await;
        let kept = enqueue(&db, "media", "a", 3).await.unwrap();
        let removed = enqueue(&db, "media", "b", 3).await.unwrap();
        dequeue(&db, "media", LOCK).await.unwrap();
        dequeue(&db, "media", LOCK).await.unwrap();

        complete(&db, kept, false).await.unwrap();
        complete(&db, removed, true).await.unwrap();

        assert_eq!(status_of(&db, kept).await.unwrap().0, "completed");
        assert!(status_of(&db, removed).await.is_none());
        assert_eq!(count_open(&db, "media").await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_job_waits_for_retry_delay() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "media", "p", 3).await.unwrap();
        dequeue(&db, "media", LOCK).await.unwrap().unwrap();

        let failure = fail(&db, id, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(failure.attempts, 1);
        assert!(!failure.exhausted);
        assert_eq!(status_of(&db, id).await.unwrap(), ("pending".to_string(), 1));

        // Not due for an hour.
        assert!(dequeue(&db, "media", LOCK).await.unwrap().is_none());
        assert_eq!(count_open(&db, "media").await.unwrap(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn job_is_exhausted_at_max_attempts() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "media", "p", 3).await.unwrap();

        let mut last = None;
        for _ in 0..3 {
            let entry = dequeue(&db, "media", LOCK).await.unwrap().unwrap();
            assert_eq!(entry.id, id);
            last = Some(fail(&db, id, Duration::ZERO).await.unwrap());
        }
        let last = last.unwrap();
        assert_eq!(last.attempts, 3);
        assert!(last.exhausted);
        assert_eq!(status_of(&db, id).await.unwrap().0, "failed");
        assert!(dequeue(&db, "media", LOCK).await.unwrap().is_none());

        remove(&db, id).await.unwrap();
        assert!(status_of(&db, id).await.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_is_requeued() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "media", "p", 3).await.unwrap();
        dequeue(&db, "media", Duration::ZERO).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(requeue_stale(&db, "media").await.unwrap(), 1);
        let again = dequeue(&db, "media", LOCK).await.unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.attempts, 0, "a lost lock is not a failed attempt");

        assert_eq!(requeue_stale(&db, "media").await.unwrap(), 0);
        db.close().await.unwrap();
    }
}
