// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client bookkeeping: last-seen IP/hostname and cumulative job/page
// counters, created on first submission and refreshed on every one after.

use chrono::{DateTime, Utc};
use printbroker_core::{Client, PrintBrokerError};
use rusqlite::{params, OptionalExtension, Row};
use tracing::instrument;

use crate::store::JobStore;

impl JobStore {
    /// Updates `ip_address`/`hostname`/`updated_at` for an existing client,
    /// preserving its counters, or inserts a fresh row with zeroed
    /// counters if `client_id` is new.
    #[instrument(skip(self), fields(client_id = client_id))]
    pub fn upsert_client(
        &self,
        client_id: &str,
        ip_address: &str,
        hostname: Option<&str>,
    ) -> Result<Client, PrintBrokerError> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO clients (client_id, ip_address, hostname, is_active, total_jobs, \
             total_pages, created_at, updated_at) VALUES (?1, ?2, ?3, 1, 0, 0, ?4, ?4) \
             ON CONFLICT(client_id) DO UPDATE SET \
             ip_address = excluded.ip_address, hostname = excluded.hostname, updated_at = excluded.updated_at",
            params![client_id, ip_address, hostname, now],
        )
        .map_err(|e| PrintBrokerError::Storage(format!("upsert_client: {e}")))?;

        conn.query_row(
            "SELECT client_id, ip_address, hostname, is_active, total_jobs, total_pages, \
             created_at, updated_at FROM clients WHERE client_id = ?1",
            params![client_id],
            row_to_client,
        )
        .map_err(|e| PrintBrokerError::Storage(format!("upsert_client read-back: {e}")))
    }

    /// Adds `jobs`/`pages` to a client's cumulative counters. A no-op if
    /// the client does not exist (callers always `upsert_client` first on
    /// the submission path, so this only fires for a data inconsistency).
    pub fn increment_client(
        &self,
        client_id: &str,
        jobs: u64,
        pages: u64,
    ) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE clients SET total_jobs = total_jobs + ?1, total_pages = total_pages + ?2, \
             updated_at = ?3 WHERE client_id = ?4",
            params![jobs as i64, pages as i64, Utc::now().to_rfc3339(), client_id],
        )
        .map_err(|e| PrintBrokerError::Storage(format!("increment_client: {e}")))?;
        Ok(())
    }

    pub fn get_client(&self, client_id: &str) -> Result<Option<Client>, PrintBrokerError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT client_id, ip_address, hostname, is_active, total_jobs, total_pages, \
             created_at, updated_at FROM clients WHERE client_id = ?1",
            params![client_id],
            row_to_client,
        )
        .optional()
        .map_err(|e| PrintBrokerError::Storage(format!("get_client: {e}")))
    }

    pub fn active_client_count(&self) -> Result<u64, PrintBrokerError> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM clients WHERE is_active = 1",
                [],
                |row| row.get(0),
            )
            .map_err(|e| PrintBrokerError::Storage(format!("active_client_count: {e}")))?;
        Ok(count as u64)
    }

    pub fn total_client_count(&self) -> Result<u64, PrintBrokerError> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))
            .map_err(|e| PrintBrokerError::Storage(format!("total_client_count: {e}")))?;
        Ok(count as u64)
    }
}

fn row_to_client(row: &Row<'_>) -> rusqlite::Result<Client> {
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;
    Ok(Client {
        client_id: row.get(0)?,
        ip_address: row.get(1)?,
        hostname: row.get(2)?,
        is_active: row.get(3)?,
        total_jobs: row.get::<_, i64>(4)? as u64,
        total_pages: row.get::<_, i64>(5)? as u64,
        created_at: parse_rfc3339(&created_at_str, 6)?,
        updated_at: parse_rfc3339(&updated_at_str, 7)?,
    })
}

fn parse_rfc3339(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_creates_then_preserves_counters_on_update() {
        let store = JobStore::open_in_memory().unwrap();
        store.upsert_client("client-1", "10.0.0.5", Some("ws5")).unwrap();
        store.increment_client("client-1", 2, 10).unwrap();

        let client = store.upsert_client("client-1", "10.0.0.6", Some("ws5-renamed")).unwrap();
        assert_eq!(client.ip_address, "10.0.0.6");
        assert_eq!(client.hostname.as_deref(), Some("ws5-renamed"));
        assert_eq!(client.total_jobs, 2);
        assert_eq!(client.total_pages, 10);
    }

    #[test]
    fn increment_client_accumulates() {
        let store = JobStore::open_in_memory().unwrap();
        store.upsert_client("c", "1.1.1.1", None).unwrap();
        store.increment_client("c", 1, 3).unwrap();
        store.increment_client("c", 1, 5).unwrap();
        let client = store.get_client("c").unwrap().unwrap();
        assert_eq!(client.total_jobs, 2);
        assert_eq!(client.total_pages, 8);
    }
}
