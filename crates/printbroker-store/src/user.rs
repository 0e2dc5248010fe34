// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Account CRUD. Out of scope for the wire protocol itself (the request
// handler only reads already-issued token claims) but required so the
// store is a complete repository for the administrative surface that
// consumes it.

use chrono::{DateTime, Utc};
use printbroker_core::{PrintBrokerError, Role, User};
use rusqlite::{params, OptionalExtension, Row};

use crate::store::JobStore;

const SELECT_COLUMNS: &str = "username, password_hash, password_salt, email, full_name, role, \
     is_active, last_login, created_at";

impl JobStore {
    pub fn create_user(&self, user: &User) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        let existing: Option<String> = conn
            .query_row(
                "SELECT username FROM users WHERE username = ?1",
                params![user.username],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| PrintBrokerError::Storage(format!("create_user lookup: {e}")))?;
        if existing.is_some() {
            return Err(PrintBrokerError::Storage(format!(
                "username already exists: {}",
                user.username
            )));
        }
        conn.execute(
            "INSERT INTO users (username, password_hash, password_salt, email, full_name, \
             role, is_active, last_login, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                user.username,
                user.password_hash,
                user.password_salt,
                user.email,
                user.full_name,
                user.role.as_str(),
                user.is_active,
                user.last_login.map(|t| t.to_rfc3339()),
                user.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| PrintBrokerError::Storage(format!("create_user insert: {e}")))?;
        Ok(())
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, PrintBrokerError> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            row_to_user,
        )
        .optional()
        .map_err(|e| PrintBrokerError::Storage(format!("get_user_by_username: {e}")))
    }

    /// Alias kept for parity with the spec's `get_user_by_id` — the user
    /// table's primary key is the username itself, so this is identical
    /// to `get_user_by_username`.
    pub fn get_user_by_id(&self, username: &str) -> Result<Option<User>, PrintBrokerError> {
        self.get_user_by_username(username)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, PrintBrokerError> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(|e| PrintBrokerError::Storage(format!("get_user_by_email: {e}")))
    }

    pub fn get_all_users(&self) -> Result<Vec<User>, PrintBrokerError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {SELECT_COLUMNS} FROM users ORDER BY username"))
            .map_err(|e| PrintBrokerError::Storage(format!("get_all_users prepare: {e}")))?;
        let users = stmt
            .query_map([], row_to_user)
            .map_err(|e| PrintBrokerError::Storage(format!("get_all_users query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| PrintBrokerError::Storage(format!("get_all_users rows: {e}")))?;
        Ok(users)
    }

    pub fn get_users_by_role(&self, role: Role) -> Result<Vec<User>, PrintBrokerError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM users WHERE role = ?1 ORDER BY username"
            ))
            .map_err(|e| PrintBrokerError::Storage(format!("get_users_by_role prepare: {e}")))?;
        let users = stmt
            .query_map(params![role.as_str()], row_to_user)
            .map_err(|e| PrintBrokerError::Storage(format!("get_users_by_role query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| PrintBrokerError::Storage(format!("get_users_by_role rows: {e}")))?;
        Ok(users)
    }

    pub fn update_user(&self, user: &User) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        let rows = conn
            .execute(
                "UPDATE users SET email = ?1, full_name = ?2, role = ?3, is_active = ?4 \
                 WHERE username = ?5",
                params![
                    user.email,
                    user.full_name,
                    user.role.as_str(),
                    user.is_active,
                    user.username,
                ],
            )
            .map_err(|e| PrintBrokerError::Storage(format!("update_user: {e}")))?;
        if rows == 0 {
            return Err(PrintBrokerError::Storage(format!(
                "user not found: {}",
                user.username
            )));
        }
        Ok(())
    }

    pub fn update_user_password(
        &self,
        username: &str,
        password_hash: &str,
        password_salt: &str,
    ) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1, password_salt = ?2 WHERE username = ?3",
                params![password_hash, password_salt, username],
            )
            .map_err(|e| PrintBrokerError::Storage(format!("update_user_password: {e}")))?;
        if rows == 0 {
            return Err(PrintBrokerError::Storage(format!("user not found: {username}")));
        }
        Ok(())
    }

    pub fn update_user_last_login(&self, username: &str) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE username = ?2",
            params![Utc::now().to_rfc3339(), username],
        )
        .map_err(|e| PrintBrokerError::Storage(format!("update_user_last_login: {e}")))?;
        Ok(())
    }

    pub fn delete_user(&self, username: &str) -> Result<(), PrintBrokerError> {
        let conn = self.lock();
        conn.execute("DELETE FROM users WHERE username = ?1", params![username])
            .map_err(|e| PrintBrokerError::Storage(format!("delete_user: {e}")))?;
        Ok(())
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get(5)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, "unknown role".into())
    })?;
    let last_login_str: Option<String> = row.get(7)?;
    let last_login = last_login_str.map(|s| parse_rfc3339(&s, 7)).transpose()?;
    let created_at_str: String = row.get(8)?;

    Ok(User {
        username: row.get(0)?,
        password_hash: row.get(1)?,
        password_salt: row.get(2)?,
        email: row.get(3)?,
        full_name: row.get(4)?,
        role,
        is_active: row.get(6)?,
        last_login,
        created_at: parse_rfc3339(&created_at_str, 8)?,
    })
}

fn parse_rfc3339(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e)))
}
