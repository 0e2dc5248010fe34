// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Schema DDL and the additive migration style used across the rest of the
// database: every ALTER TABLE is issued on its own and a failure (the
// column already exists) is swallowed rather than propagated, so opening
// an older database file never requires a destructive rewrite.

use rusqlite::Connection;

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    job_id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL,
    user_name TEXT NOT NULL,
    document_name TEXT NOT NULL,
    file_format TEXT NOT NULL,
    file_size_bytes INTEGER NOT NULL,
    page_count INTEGER NOT NULL,
    page_size TEXT NOT NULL,
    orientation TEXT NOT NULL,
    copies INTEGER NOT NULL,
    color INTEGER NOT NULL,
    duplex INTEGER NOT NULL,
    quality TEXT NOT NULL,
    margin_top REAL NOT NULL,
    margin_bottom REAL NOT NULL,
    margin_left REAL NOT NULL,
    margin_right REAL NOT NULL,
    priority INTEGER NOT NULL,
    queue_position INTEGER,
    retry_count INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL DEFAULT 3,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    processing_time_ms INTEGER,
    error_message TEXT,
    status TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_job_id ON jobs(job_id);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_status_priority ON jobs(status, priority);
CREATE INDEX IF NOT EXISTS idx_jobs_user_created ON jobs(user_name, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_client_id ON jobs(client_id);

CREATE TABLE IF NOT EXISTS clients (
    client_id TEXT PRIMARY KEY,
    ip_address TEXT NOT NULL,
    hostname TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    total_jobs INTEGER NOT NULL DEFAULT 0,
    total_pages INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL,
    password_salt TEXT NOT NULL,
    email TEXT,
    full_name TEXT,
    role TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_login TEXT,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username ON users(username);

CREATE TABLE IF NOT EXISTS daily_stats (
    date TEXT PRIMARY KEY,
    total_jobs INTEGER NOT NULL DEFAULT 0,
    completed_jobs INTEGER NOT NULL DEFAULT 0,
    failed_jobs INTEGER NOT NULL DEFAULT 0,
    cancelled_jobs INTEGER NOT NULL DEFAULT 0,
    total_pages INTEGER NOT NULL DEFAULT 0,
    avg_processing_time_ms REAL NOT NULL DEFAULT 0,
    uptime_seconds INTEGER NOT NULL DEFAULT 0
);
"#;

/// Columns added after the first shipped schema. Each statement is applied
/// independently; "duplicate column" failures on an already-migrated
/// database are expected and ignored.
const MIGRATIONS_SQL: &[&str] = &[
    "ALTER TABLE clients ADD COLUMN is_active INTEGER NOT NULL DEFAULT 1",
    "ALTER TABLE users ADD COLUMN full_name TEXT",
];

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_TABLES_SQL)?;
    apply_migrations(conn);
    Ok(())
}

fn apply_migrations(conn: &Connection) {
    for stmt in MIGRATIONS_SQL {
        if conn.execute_batch(stmt).is_err() {
            // Column already present on a database created by a later
            // schema version — expected, not an error.
        }
    }
}
