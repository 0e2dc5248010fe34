// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bound-checks and regex-filters every externally supplied field before it
// reaches the store or the filesystem. Failure messages never echo the
// offending value back — only the field name.

use printbroker_core::PrintBrokerError;
use regex::Regex;
use std::sync::LazyLock;

pub const MAX_CLIENT_ID_LEN: usize = 100;
pub const MAX_USERNAME_LEN: usize = 50;
pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_JOB_ID_LEN: usize = 100;
pub const MAX_DOCUMENT_NAME_LEN: usize = 255;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "ps", "postscript"];

static CLIENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap());
static JOB_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
static DOCUMENT_NAME_DISALLOWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9 _.()\-]").unwrap());

fn validation_error(field: &str, reason: &str) -> PrintBrokerError {
    PrintBrokerError::Validation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Validates `client_id`: `[A-Za-z0-9_-]+`, 1..=100 chars.
pub fn validate_client_id(value: &str) -> Result<(), PrintBrokerError> {
    if value.is_empty() {
        return Err(validation_error("client_id", "empty"));
    }
    if value.len() > MAX_CLIENT_ID_LEN {
        return Err(validation_error("client_id", "too long"));
    }
    if !CLIENT_ID_RE.is_match(value) {
        return Err(validation_error("client_id", "disallowed characters"));
    }
    Ok(())
}

/// Validates `username`: `[A-Za-z0-9_.-]+`, 3..=50 chars.
pub fn validate_username(value: &str) -> Result<(), PrintBrokerError> {
    if value.len() < MIN_USERNAME_LEN {
        return Err(validation_error("username", "too short"));
    }
    if value.len() > MAX_USERNAME_LEN {
        return Err(validation_error("username", "too long"));
    }
    if !USERNAME_RE.is_match(value) {
        return Err(validation_error("username", "disallowed characters"));
    }
    Ok(())
}

/// Validates `job_id`: `[A-Za-z0-9_-]+`, 1..=100 chars.
pub fn validate_job_id(value: &str) -> Result<(), PrintBrokerError> {
    if value.is_empty() {
        return Err(validation_error("job_id", "empty"));
    }
    if value.len() > MAX_JOB_ID_LEN {
        return Err(validation_error("job_id", "too long"));
    }
    if !JOB_ID_RE.is_match(value) {
        return Err(validation_error("job_id", "disallowed characters"));
    }
    Ok(())
}

/// Strips characters outside `A-Za-z0-9 _.()-` from a document name rather
/// than rejecting it, then enforces the length bound on the result.
pub fn sanitize_document_name(value: &str) -> Result<String, PrintBrokerError> {
    let cleaned: String = DOCUMENT_NAME_DISALLOWED_RE.replace_all(value, "").into_owned();
    if cleaned.is_empty() {
        return Err(validation_error("document_name", "empty after sanitization"));
    }
    if cleaned.len() > MAX_DOCUMENT_NAME_LEN {
        return Err(validation_error("document_name", "too long"));
    }
    Ok(cleaned)
}

/// Validates a file extension (without the leading dot) against the closed
/// allow-list.
pub fn validate_file_extension(ext: &str) -> Result<(), PrintBrokerError> {
    if ALLOWED_EXTENSIONS.contains(&ext) {
        Ok(())
    } else {
        Err(validation_error("file_format", "unsupported extension"))
    }
}

/// Validates a payload's declared size against the configured ceiling.
pub fn validate_file_size(size_bytes: u64, max_bytes: u64) -> Result<(), PrintBrokerError> {
    if size_bytes > max_bytes {
        Err(validation_error("file_size_bytes", "exceeds ceiling"))
    } else {
        Ok(())
    }
}

/// Rejects a relative path if any component is `..`, or if joining it onto
/// `root` would resolve outside of `root`.
pub fn sanitize_path_component(root: &std::path::Path, candidate: &str) -> Result<std::path::PathBuf, PrintBrokerError> {
    let candidate_path = std::path::Path::new(candidate);
    for component in candidate_path.components() {
        if component.as_os_str() == ".." {
            return Err(validation_error("path", "parent traversal"));
        }
    }
    let joined = root.join(candidate_path);
    Ok(joined)
}

pub fn validate_priority(priority: i64) -> Result<u8, PrintBrokerError> {
    if (1..=10).contains(&priority) {
        Ok(priority as u8)
    } else {
        Err(validation_error("priority", "out of range [1,10]"))
    }
}

pub fn validate_copies(copies: i64) -> Result<u32, PrintBrokerError> {
    if copies >= 1 {
        Ok(copies as u32)
    } else {
        Err(validation_error("copies", "must be >= 1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_accepts_allowed_charset() {
        assert!(validate_client_id("workstation-42_lab").is_ok());
    }

    #[test]
    fn client_id_rejects_path_traversal_and_whitespace() {
        for bad in ["../etc", "a b", "a/b", "a\\b", "a@b", "a\u{0}b"] {
            assert!(validate_client_id(bad).is_err(), "expected rejection for {bad:?}");
        }
    }

    #[test]
    fn client_id_rejects_over_length() {
        let long = "a".repeat(MAX_CLIENT_ID_LEN + 1);
        assert!(validate_client_id(&long).is_err());
    }

    #[test]
    fn username_enforces_minimum_length() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("abc").is_ok());
    }

    #[test]
    fn job_id_rejects_disallowed_charset() {
        for bad in ["..", "job/1", "job id", "job@1"] {
            assert!(validate_job_id(bad).is_err());
        }
    }

    #[test]
    fn document_name_strips_rather_than_rejects() {
        let cleaned = sanitize_document_name("report<>:2026!.pdf").unwrap();
        assert_eq!(cleaned, "report2026.pdf");
    }

    #[test]
    fn file_extension_allow_list() {
        assert!(validate_file_extension("pdf").is_ok());
        assert!(validate_file_extension("exe").is_err());
    }

    #[test]
    fn path_traversal_rejected() {
        let root = std::path::Path::new("/var/printbroker/tmp");
        assert!(sanitize_path_component(root, "../../etc/passwd").is_err());
        assert!(sanitize_path_component(root, "job-123.pdf").is_ok());
    }

    #[test]
    fn priority_is_clamped_to_closed_range() {
        assert!(validate_priority(0).is_err());
        assert!(validate_priority(11).is_err());
        assert_eq!(validate_priority(5).unwrap(), 5);
    }
}
