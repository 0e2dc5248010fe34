// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Domain types shared across the print broker: jobs, clients, users, and
// the daily aggregate counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, globally unique job identifier. Printable-ASCII, ≤100 chars on
/// the wire; backed by a UUIDv4 internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a print job. See the state machine in the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Printing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Printing => "printing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "printing" => Some(JobStatus::Printing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Page size. Deliberately a closed set — the validator rejects everything
/// else before a job ever reaches this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
}

impl PageSize {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A4" => Some(PageSize::A4),
            "A3" => Some(PageSize::A3),
            "A5" => Some(PageSize::A5),
            "Letter" => Some(PageSize::Letter),
            "Legal" => Some(PageSize::Legal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::A3 => "A3",
            PageSize::A5 => "A5",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "portrait" => Some(Orientation::Portrait),
            "landscape" => Some(Orientation::Landscape),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Draft,
    Normal,
    High,
}

impl Quality {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Quality::Draft),
            "normal" => Some(Quality::Normal),
            "high" => Some(Quality::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Draft => "draft",
            Quality::Normal => "normal",
            Quality::High => "high",
        }
    }
}

/// Print margins in millimetres. Default matches the original's 10mm each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 10.0,
            bottom: 10.0,
            left: 10.0,
            right: 10.0,
        }
    }
}

/// A durable print job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub job_id: JobId,
    pub client_id: String,
    pub user_name: String,
    pub document_name: String,
    pub file_format: String,
    pub file_size_bytes: u64,
    pub page_count: u32,
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub copies: u32,
    pub color: bool,
    pub duplex: bool,
    pub quality: Quality,
    pub margins: Margins,
    pub priority: u8,
    pub queue_position: Option<u32>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,
    pub error_message: Option<String>,
    pub status: JobStatus,
}

impl PrintJob {
    /// Builds a fresh `pending` job with scheduling defaults (priority 5,
    /// max_retries 3), matching `submit_job`'s fallback in the original.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_id: impl Into<String>,
        user_name: impl Into<String>,
        document_name: impl Into<String>,
        file_format: impl Into<String>,
        file_size_bytes: u64,
        page_count: u32,
        page_size: PageSize,
        orientation: Orientation,
        copies: u32,
        color: bool,
        duplex: bool,
        quality: Quality,
        margins: Margins,
        priority: u8,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            client_id: client_id.into(),
            user_name: user_name.into(),
            document_name: document_name.into(),
            file_format: file_format.into(),
            file_size_bytes,
            page_count,
            page_size,
            orientation,
            copies,
            color,
            duplex,
            quality,
            margins,
            priority: priority.clamp(1, 10),
            queue_position: None,
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processing_time_ms: None,
            error_message: None,
            status: JobStatus::Pending,
        }
    }
}

/// A remote workstation that has submitted at least one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub ip_address: String,
    pub hostname: Option<String>,
    pub is_active: bool,
    pub total_jobs: u64,
    pub total_pages: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role carried by an authenticated user and echoed into token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

/// A registered account. Passwords are never stored in plaintext; only the
/// PBKDF2 hash and salt ever reach the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub password_salt: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One calendar day's aggregate counters. Upserted idempotently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: chrono::NaiveDate,
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub cancelled_jobs: u64,
    pub total_pages: u64,
    pub avg_processing_time_ms: f64,
    pub uptime_seconds: u64,
}

/// Server process lifecycle, used for the `status` message and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_round_trips_through_display_and_parse() {
        let id = JobId::new();
        let parsed = JobId::parse(&id.to_string()).expect("must parse own output");
        assert_eq!(id, parsed);
    }

    #[test]
    fn new_job_clamps_priority_and_defaults_retries() {
        let job = PrintJob::new(
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
            99,
        );
        assert_eq!(job.priority, 10);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn job_status_parse_round_trips() {
        for s in ["pending", "printing", "completed", "failed", "cancelled"] {
            let status = JobStatus::parse(s).expect("known status string");
            assert_eq!(status.as_str(), s);
        }
        assert!(JobStatus::parse("bogus").is_none());
    }
}
