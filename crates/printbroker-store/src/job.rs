// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job CRUD. `job_id` is the externally visible, globally unique key;
// `rowid` (SQLite's implicit integer key) is the "internal id" the spec's
// `get_job_by_internal` refers to.

use chrono::{DateTime, Utc};
use printbroker_core::{
    JobId, JobStatus, Margins, Orientation, PageSize, PrintBrokerError, PrintJob, Quality,
};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, instrument};

use crate::store::JobStore;

const SELECT_COLUMNS: &str = "rowid, job_id, client_id, user_name, document_name, file_format, \
     file_size_bytes, page_count, page_size, orientation, copies, color, duplex, quality, \
     margin_top, margin_bottom, margin_left, margin_right, priority, queue_position, \
     retry_count, max_retries, created_at, started_at, completed_at, processing_time_ms, \
     error_message, status";

/// A partial update applied atomically to one job row.
///
/// Every field is `Option`; `None` means "leave unchanged". Nullable
/// columns (`error_message`) use `Option<Option<T>>`: `Some(None)` clears
/// the column, `None` leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub processing_time_ms: Option<Option<i64>>,
    pub error_message: Option<Option<String>>,
    pub retry_count: Option<u32>,
    pub priority: Option<u8>,
    pub queue_position: Option<Option<u32>>,
}

impl JobPatch {
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(Some(at));
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(Some(at));
        self
    }

    pub fn processing_time_ms(mut self, ms: i64) -> Self {
        self.processing_time_ms = Some(Some(ms));
        self
    }

    pub fn error_message(mut self, msg: impl Into<String>) -> Self {
        self.error_message = Some(Some(msg.into()));
        self
    }

    pub fn clear_error_message(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority.clamp(1, 10));
        self
    }

    pub fn queue_position(mut self, position: Option<u32>) -> Self {
        self.queue_position = Some(position);
        self
    }
}

impl JobStore {
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub fn create_job(&self, job: &PrintJob) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        let existing: Option<String> = conn
            .query_row(
                "SELECT job_id FROM jobs WHERE job_id = ?1",
                params![job.job_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| PrintBrokerError::Storage(format!("create_job lookup: {e}")))?;
        if existing.is_some() {
            return Err(PrintBrokerError::DuplicateJobId(job.job_id.to_string()));
        }

        conn.execute(
            "INSERT INTO jobs (job_id, client_id, user_name, document_name, file_format, \
             file_size_bytes, page_count, page_size, orientation, copies, color, duplex, \
             quality, margin_top, margin_bottom, margin_left, margin_right, priority, \
             queue_position, retry_count, max_retries, created_at, started_at, completed_at, \
             processing_time_ms, error_message, status) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27)",
            params![
                job.job_id.to_string(),
                job.client_id,
                job.user_name,
                job.document_name,
                job.file_format,
                job.file_size_bytes as i64,
                job.page_count as i64,
                job.page_size.as_str(),
                job.orientation.as_str(),
                job.copies as i64,
                job.color,
                job.duplex,
                job.quality.as_str(),
                job.margins.top,
                job.margins.bottom,
                job.margins.left,
                job.margins.right,
                job.priority as i64,
                job.queue_position,
                job.retry_count as i64,
                job.max_retries as i64,
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.processing_time_ms,
                job.error_message,
                job.status.as_str(),
            ],
        )
        .map_err(|e| PrintBrokerError::Storage(format!("create_job insert: {e}")))?;
        debug!(job_id = %job.job_id, "job created");
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<PrintJob>, PrintBrokerError> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE job_id = ?1"),
            params![job_id],
            row_to_job,
        )
        .optional()
        .map_err(|e| PrintBrokerError::Storage(format!("get_job: {e}")))
    }

    /// Looks a job up by SQLite's implicit `rowid` rather than `job_id`.
    pub fn get_job_by_internal(&self, id: i64) -> Result<Option<PrintJob>, PrintBrokerError> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE rowid = ?1"),
            params![id],
            row_to_job,
        )
        .optional()
        .map_err(|e| PrintBrokerError::Storage(format!("get_job_by_internal: {e}")))
    }

    /// Applies a partial update. Returns `Ok(None)` without error if
    /// `job_id` does not exist (a no-op, per the spec).
    #[instrument(skip(self, patch), fields(job_id = job_id))]
    pub fn update_job(
        &self,
        job_id: &str,
        patch: JobPatch,
    ) -> Result<Option<PrintJob>, PrintBrokerError> {
        let conn = self.lock();
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        macro_rules! set_field {
            ($col:literal, $val:expr) => {{
                sets.push(format!("{} = ?{}", $col, sets.len() + 1));
                values.push(Box::new($val));
            }};
        }

        if let Some(status) = &patch.status {
            set_field!("status", status.as_str().to_string());
        }
        if let Some(started_at) = patch.started_at {
            set_field!("started_at", started_at.map(|t| t.to_rfc3339()));
        }
        if let Some(completed_at) = patch.completed_at {
            set_field!("completed_at", completed_at.map(|t| t.to_rfc3339()));
        }
        if let Some(ms) = patch.processing_time_ms {
            set_field!("processing_time_ms", ms);
        }
        if let Some(msg) = patch.error_message {
            set_field!("error_message", msg);
        }
        if let Some(count) = patch.retry_count {
            set_field!("retry_count", count as i64);
        }
        if let Some(priority) = patch.priority {
            set_field!("priority", priority as i64);
        }
        if let Some(position) = patch.queue_position {
            set_field!("queue_position", position);
        }

        if sets.is_empty() {
            drop(conn);
            return self.get_job(job_id);
        }

        let sql = format!(
            "UPDATE jobs SET {} WHERE job_id = ?{}",
            sets.join(", "),
            values.len() + 1
        );
        values.push(Box::new(job_id.to_string()));

        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = conn
            .execute(&sql, param_refs.as_slice())
            .map_err(|e| PrintBrokerError::Storage(format!("update_job: {e}")))?;
        drop(conn);

        if rows == 0 {
            return Ok(None);
        }
        self.get_job(job_id)
    }

    /// Pending jobs ordered `(priority ASC, created_at ASC)`, capped at
    /// `limit` (pass `u32::MAX` for "unbounded", used at boot recovery).
    pub fn pending_jobs(&self, limit: u32) -> Result<Vec<PrintJob>, PrintBrokerError> {
        self.jobs_by_status_ordered(JobStatus::Pending, limit)
    }

    pub fn next_pending(&self) -> Result<Option<PrintJob>, PrintBrokerError> {
        Ok(self.pending_jobs(1)?.into_iter().next())
    }

    pub fn jobs_by_status(&self, status: JobStatus) -> Result<Vec<PrintJob>, PrintBrokerError> {
        self.jobs_by_status_ordered(status, u32::MAX)
    }

    fn jobs_by_status_ordered(
        &self,
        status: JobStatus,
        limit: u32,
    ) -> Result<Vec<PrintJob>, PrintBrokerError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM jobs WHERE status = ?1 \
             ORDER BY priority ASC, created_at ASC LIMIT ?2"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| PrintBrokerError::Storage(format!("jobs_by_status prepare: {e}")))?;
        let jobs = stmt
            .query_map(params![status.as_str(), limit], row_to_job)
            .map_err(|e| PrintBrokerError::Storage(format!("jobs_by_status query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| PrintBrokerError::Storage(format!("jobs_by_status rows: {e}")))?;
        Ok(jobs)
    }

    pub fn jobs_by_user(&self, user_name: &str) -> Result<Vec<PrintJob>, PrintBrokerError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM jobs WHERE user_name = ?1 ORDER BY created_at DESC"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| PrintBrokerError::Storage(format!("jobs_by_user prepare: {e}")))?;
        let jobs = stmt
            .query_map(params![user_name], row_to_job)
            .map_err(|e| PrintBrokerError::Storage(format!("jobs_by_user query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| PrintBrokerError::Storage(format!("jobs_by_user rows: {e}")))?;
        Ok(jobs)
    }

    pub fn recent_jobs(&self, limit: u32) -> Result<Vec<PrintJob>, PrintBrokerError> {
        let conn = self.lock();
        let sql = format!("SELECT {SELECT_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT ?1");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| PrintBrokerError::Storage(format!("recent_jobs prepare: {e}")))?;
        let jobs = stmt
            .query_map(params![limit], row_to_job)
            .map_err(|e| PrintBrokerError::Storage(format!("recent_jobs query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| PrintBrokerError::Storage(format!("recent_jobs rows: {e}")))?;
        Ok(jobs)
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64, PrintBrokerError> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| PrintBrokerError::Storage(format!("count_by_status: {e}")))?;
        Ok(count as u64)
    }

    pub fn delete_job(&self, job_id: &str) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        conn.execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id])
            .map_err(|e| PrintBrokerError::Storage(format!("delete_job: {e}")))?;
        Ok(())
    }

    /// Deletes terminal-state jobs whose `completed_at` is older than
    /// `days` days. Returns the number of rows removed.
    pub fn cleanup_old_jobs(&self, days: i64) -> Result<u64, PrintBrokerError> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let conn = self.lock();
        let removed = conn
            .execute(
                "DELETE FROM jobs WHERE status IN ('completed','failed','cancelled') \
                 AND completed_at IS NOT NULL AND completed_at < ?1",
                params![cutoff],
            )
            .map_err(|e| PrintBrokerError::Storage(format!("cleanup_old_jobs: {e}")))?;
        Ok(removed as u64)
    }
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<PrintJob> {
    let job_id_str: String = row.get(1)?;
    let job_id = JobId::parse(&job_id_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            "malformed job_id".into(),
        )
    })?;

    let page_size_str: String = row.get(8)?;
    let page_size = PageSize::parse(&page_size_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            "unknown page_size".into(),
        )
    })?;

    let orientation_str: String = row.get(9)?;
    let orientation = Orientation::parse(&orientation_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            "unknown orientation".into(),
        )
    })?;

    let quality_str: String = row.get(13)?;
    let quality = Quality::parse(&quality_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            13,
            rusqlite::types::Type::Text,
            "unknown quality".into(),
        )
    })?;

    let status_str: String = row.get(27)?;
    let status = JobStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            27,
            rusqlite::types::Type::Text,
            "unknown status".into(),
        )
    })?;

    let created_at_str: String = row.get(22)?;
    let created_at = parse_rfc3339(&created_at_str, 22)?;

    let started_at_str: Option<String> = row.get(23)?;
    let started_at = started_at_str.map(|s| parse_rfc3339(&s, 23)).transpose()?;

    let completed_at_str: Option<String> = row.get(24)?;
    let completed_at = completed_at_str
        .map(|s| parse_rfc3339(&s, 24))
        .transpose()?;

    Ok(PrintJob {
        job_id,
        client_id: row.get(2)?,
        user_name: row.get(3)?,
        document_name: row.get(4)?,
        file_format: row.get(5)?,
        file_size_bytes: row.get::<_, i64>(6)? as u64,
        page_count: row.get::<_, i64>(7)? as u32,
        page_size,
        orientation,
        copies: row.get::<_, i64>(10)? as u32,
        color: row.get(11)?,
        duplex: row.get(12)?,
        quality,
        margins: Margins {
            top: row.get(14)?,
            bottom: row.get(15)?,
            left: row.get(16)?,
            right: row.get(17)?,
        },
        priority: row.get::<_, i64>(18)? as u8,
        queue_position: row.get::<_, Option<i64>>(19)?.map(|v| v as u32),
        retry_count: row.get::<_, i64>(20)? as u32,
        max_retries: row.get::<_, i64>(21)? as u32,
        created_at,
        started_at,
        completed_at,
        processing_time_ms: row.get(25)?,
        error_message: row.get(26)?,
        status,
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
    use printbroker_core::{JobStatus, Margins, Orientation, PageSize, PrintJob, Quality};

    fn test_job() -> PrintJob {
        PrintJob::new(
            "client-1",
            "alice",
            "report.pdf",
            "pdf",
            512,
            1,
            PageSize::A4,
            Orientation::Portrait,
            1,
            true,
            false,
            Quality::Normal,
            Margins::default(),
            5,
        )
    }

    #[test]
    fn create_and_get_round_trips() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job();
        store.create_job(&job).unwrap();
        let fetched = store.get_job(&job.job_id.to_string()).unwrap().unwrap();
        assert_eq!(fetched.job_id, job.job_id);
        assert_eq!(fetched.document_name, "report.pdf");
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[test]
    fn duplicate_job_id_is_rejected() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job();
        store.create_job(&job).unwrap();
        let err = store.create_job(&job).unwrap_err();
        assert!(matches!(err, PrintBrokerError::DuplicateJobId(_)));
    }

    #[test]
    fn update_job_applies_partial_patch() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job();
        store.create_job(&job).unwrap();

        let now = Utc::now();
        store
            .update_job(
                &job.job_id.to_string(),
                JobPatch::default().status(JobStatus::Printing).started_at(now),
            )
            .unwrap();

        let updated = store.get_job(&job.job_id.to_string()).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Printing);
        assert!(updated.started_at.is_some());
        assert!(updated.completed_at.is_none());
    }

    #[test]
    fn update_job_on_unknown_id_is_a_noop() {
        let store = JobStore::open_in_memory().unwrap();
        let result = store
            .update_job("does-not-exist", JobPatch::default().status(JobStatus::Failed))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn pending_jobs_orders_by_priority_then_created_at() {
        let store = JobStore::open_in_memory().unwrap();
        let mut j1 = test_job();
        j1.priority = 10;
        let mut j2 = test_job();
        j2.priority = 1;
        let mut j3 = test_job();
        j3.priority = 5;
        store.create_job(&j1).unwrap();
        store.create_job(&j2).unwrap();
        store.create_job(&j3).unwrap();

        let pending = store.pending_jobs(u32::MAX).unwrap();
        assert_eq!(pending[0].job_id, j2.job_id);
        assert_eq!(pending[1].job_id, j3.job_id);
        assert_eq!(pending[2].job_id, j1.job_id);
    }

    #[test]
    fn count_by_status_reflects_transitions() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job();
        store.create_job(&job).unwrap();
        assert_eq!(store.count_by_status(JobStatus::Pending).unwrap(), 1);
        store
            .update_job(&job.job_id.to_string(), JobPatch::default().status(JobStatus::Completed))
            .unwrap();
        assert_eq!(store.count_by_status(JobStatus::Pending).unwrap(), 0);
        assert_eq!(store.count_by_status(JobStatus::Completed).unwrap(), 1);
    }

    #[test]
    fn delete_job_is_idempotent() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job();
        store.create_job(&job).unwrap();
        store.delete_job(&job.job_id.to_string()).unwrap();
        store.delete_job(&job.job_id.to_string()).unwrap();
        assert!(store.get_job(&job.job_id.to_string()).unwrap().is_none());
    }

    #[test]
    fn get_job_by_internal_matches_rowid() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job();
        store.create_job(&job).unwrap();
        let fetched = store.get_job_by_internal(1).unwrap().unwrap();
        assert_eq!(fetched.job_id, job.job_id);
    }
}
