// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `JobStore` owns the single SQLite connection backing every durable
// table. Access is serialized behind a `Mutex` — rusqlite connections are
// `Send` but not `Sync`, and every call here is short enough that a
// process-wide lock is not a bottleneck at print-broker scale.

use printbroker_core::PrintBrokerError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, instrument};

use crate::schema;

pub struct JobStore {
    pub(crate) conn: Mutex<Connection>,
}

impl JobStore {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PrintBrokerError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| PrintBrokerError::Storage(format!("open: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| PrintBrokerError::Storage(format!("WAL pragma: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| PrintBrokerError::Storage(format!("foreign_keys pragma: {e}")))?;
        schema::init_schema(&conn).map_err(|e| PrintBrokerError::Storage(format!("schema: {e}")))?;
        info!("job store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory database. Used by tests and by any embedder that
    /// does not need durability across restarts.
    pub fn open_in_memory() -> Result<Self, PrintBrokerError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PrintBrokerError::Storage(format!("open in-memory: {e}")))?;
        schema::init_schema(&conn).map_err(|e| PrintBrokerError::Storage(format!("schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("job store mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_creates_all_tables() {
        let store = JobStore::open_in_memory().expect("open");
        let conn = store.lock();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        for expected in ["jobs", "clients", "users", "daily_stats"] {
            assert!(names.iter().any(|n| n == expected), "missing table {expected}");
        }
    }
}
