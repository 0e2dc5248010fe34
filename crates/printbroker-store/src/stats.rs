// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Daily aggregate counters and the cross-table dashboard summary.

use chrono::NaiveDate;
use printbroker_core::{DailyStats, JobStatus, PrintBrokerError};
use rusqlite::{params, OptionalExtension, Row};

use crate::store::JobStore;

/// Aggregated counters for a dashboard-style overview.
#[derive(Debug, Clone, Default)]
pub struct StoreSummary {
    pub total_jobs: u64,
    pub pending_jobs: u64,
    pub printing_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub cancelled_jobs: u64,
    pub total_pages: u64,
    pub total_clients: u64,
    pub active_clients: u64,
}

impl JobStore {
    /// Upserts one calendar day's counters. The increments supplied are
    /// added to whatever is already recorded for that date; a fresh
    /// average is derived from the running total and count so the write
    /// path stays idempotent whether or not a row already existed.
    pub fn record_daily_stat(
        &self,
        date: NaiveDate,
        completed: u64,
        failed: u64,
        cancelled: u64,
        pages: u64,
        processing_time_ms: i64,
    ) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        let date_str = date.to_string();

        let existing: Option<(u64, u64, u64, u64, u64, f64)> = conn
            .query_row(
                "SELECT total_jobs, completed_jobs, failed_jobs, cancelled_jobs, total_pages, \
                 avg_processing_time_ms FROM daily_stats WHERE date = ?1",
                params![date_str],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                        row.get::<_, i64>(3)? as u64,
                        row.get::<_, i64>(4)? as u64,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| PrintBrokerError::Storage(format!("record_daily_stat read: {e}")))?;

        let delta_jobs = completed + failed + cancelled;
        let (prev_total, prev_completed, prev_failed, prev_cancelled, prev_pages, prev_avg) =
            existing.unwrap_or_default();

        let new_total = prev_total + delta_jobs;
        let new_completed = prev_completed + completed;
        let new_failed = prev_failed + failed;
        let new_cancelled = prev_cancelled + cancelled;
        let new_pages = prev_pages + pages;
        let new_avg = if new_total == 0 {
            0.0
        } else {
            (prev_avg * prev_total as f64 + processing_time_ms as f64 * delta_jobs as f64)
                / new_total as f64
        };

        conn.execute(
            "INSERT INTO daily_stats (date, total_jobs, completed_jobs, failed_jobs, \
             cancelled_jobs, total_pages, avg_processing_time_ms, uptime_seconds) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0) \
             ON CONFLICT(date) DO UPDATE SET \
             total_jobs = excluded.total_jobs, completed_jobs = excluded.completed_jobs, \
             failed_jobs = excluded.failed_jobs, cancelled_jobs = excluded.cancelled_jobs, \
             total_pages = excluded.total_pages, avg_processing_time_ms = excluded.avg_processing_time_ms",
            params![
                date_str,
                new_total as i64,
                new_completed as i64,
                new_failed as i64,
                new_cancelled as i64,
                new_pages as i64,
                new_avg,
            ],
        )
        .map_err(|e| PrintBrokerError::Storage(format!("record_daily_stat write: {e}")))?;
        Ok(())
    }

    pub fn daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>, PrintBrokerError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT date, total_jobs, completed_jobs, failed_jobs, cancelled_jobs, \
             total_pages, avg_processing_time_ms, uptime_seconds FROM daily_stats WHERE date = ?1",
            params![date.to_string()],
            row_to_daily_stats,
        )
        .optional()
        .map_err(|e| PrintBrokerError::Storage(format!("daily_stats: {e}")))
    }

    pub fn set_uptime_seconds(&self, date: NaiveDate, uptime_seconds: u64) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO daily_stats (date, uptime_seconds) VALUES (?1, ?2) \
             ON CONFLICT(date) DO UPDATE SET uptime_seconds = excluded.uptime_seconds",
            params![date.to_string(), uptime_seconds as i64],
        )
        .map_err(|e| PrintBrokerError::Storage(format!("set_uptime_seconds: {e}")))?;
        Ok(())
    }

    /// Aggregated counters across all jobs and clients, for the `status`
    /// message and any administrative dashboard.
    pub fn summary(&self) -> Result<StoreSummary, PrintBrokerError> {
        Ok(StoreSummary {
            total_jobs: self.count_all_jobs()?,
            pending_jobs: self.count_by_status(JobStatus::Pending)?,
            printing_jobs: self.count_by_status(JobStatus::Printing)?,
            completed_jobs: self.count_by_status(JobStatus::Completed)?,
            failed_jobs: self.count_by_status(JobStatus::Failed)?,
            cancelled_jobs: self.count_by_status(JobStatus::Cancelled)?,
            total_pages: self.total_pages_printed()?,
            total_clients: self.total_client_count()?,
            active_clients: self.active_client_count()?,
        })
    }

    fn count_all_jobs(&self) -> Result<u64, PrintBrokerError> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))
            .map_err(|e| PrintBrokerError::Storage(format!("count_all_jobs: {e}")))?;
        Ok(count as u64)
    }

    fn total_pages_printed(&self) -> Result<u64, PrintBrokerError> {
        let conn = self.lock();
        let total: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(page_count), 0) FROM jobs WHERE status = 'completed'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| PrintBrokerError::Storage(format!("total_pages_printed: {e}")))?;
        Ok(total as u64)
    }
}

fn row_to_daily_stats(row: &Row<'_>) -> rusqlite::Result<DailyStats> {
    let date_str: String = row.get(0)?;
    let date = date_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(DailyStats {
        date,
        total_jobs: row.get::<_, i64>(1)? as u64,
        completed_jobs: row.get::<_, i64>(2)? as u64,
        failed_jobs: row.get::<_, i64>(3)? as u64,
        cancelled_jobs: row.get::<_, i64>(4)? as u64,
        total_pages: row.get::<_, i64>(5)? as u64,
        avg_processing_time_ms: row.get(6)?,
        uptime_seconds: row.get::<_, i64>(7)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
    }

    #[test]
    fn record_daily_stat_upserts_idempotently() {
        let store = JobStore::open_in_memory().unwrap();
        store.record_daily_stat(date(), 1, 0, 0, 3, 1000).unwrap();
        store.record_daily_stat(date(), 1, 1, 0, 5, 2000).unwrap();

        let stats = store.daily_stats(date()).unwrap().unwrap();
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.completed_jobs, 2);
        assert_eq!(stats.failed_jobs, 1);
        assert_eq!(stats.total_pages, 8);
    }

    #[test]
    fn missing_date_returns_none() {
        let store = JobStore::open_in_memory().unwrap();
        assert!(store.daily_stats(date()).unwrap().is_none());
    }

    #[test]
    fn summary_reflects_job_and_client_counts() {
        let store = JobStore::open_in_memory().unwrap();
        store.upsert_client("c1", "10.0.0.1", None).unwrap();
        let job = printbroker_core::PrintJob::new(
            "c1",
            "alice",
            "doc.pdf",
            "pdf",
            100,
            2,
            printbroker_core::PageSize::A4,
            printbroker_core::Orientation::Portrait,
            1,
            false,
            false,
            printbroker_core::Quality::Normal,
            printbroker_core::Margins::default(),
            5,
        );
        store.create_job(&job).unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.total_jobs, 1);
        assert_eq!(summary.pending_jobs, 1);
        assert_eq!(summary.total_clients, 1);
        assert_eq!(summary.active_clients, 1);
    }
}
