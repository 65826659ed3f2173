// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-key async mutual exclusion.
//!
//! Used to serialize the find-or-create critical section per
//! (contact, channel) pair without a global lock. Entries are created on
//! first use and removed when the last holder or waiter lets go.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// A table of named async mutexes.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    table: LockTable,
}

/// Holds the lock for one key until dropped.
pub struct KeyedGuard {
    key: String,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds `key`, then takes it.
    pub async fn lock(&self, key: impl Into<String>) -> KeyedGuard {
        let key = key.into();
        let mutex = self
            .table
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            key,
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl KeyedGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // Release first so the guard's Arc no longer counts.
        self.guard.take();
        self.table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
