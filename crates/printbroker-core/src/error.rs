// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Printbroker.

use thiserror::Error;

/// Top-level error type for all Printbroker operations.
///
/// Each variant maps to exactly one wire-visible [`ErrorCode`] via
/// [`PrintBrokerError::code`]. The `Display` text on a variant may carry
/// internal detail (file paths, SQL messages) and must never be sent to a
/// client directly — use [`ErrorCode::client_message`] for that.
#[derive(Debug, Error)]
pub enum PrintBrokerError {
    // -- AUTH --
    #[error("missing bearer token")]
    MissingToken,

    #[error("token invalid: {0}")]
    TokenInvalid(String),

    #[error("token expired")]
    TokenExpired,

    // -- QUOTA --
    #[error("rate limit exceeded, retry after {retry_after_secs:.1}s")]
    RateLimited { retry_after_secs: f64 },

    // -- INPUT --
    #[error("validation failed on field {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("frame error: {0}")]
    Framing(String),

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    // -- RESOURCE --
    #[error("duplicate job id: {0}")]
    DuplicateJobId(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    // -- BACKEND --
    #[error("print job error: {0}")]
    PrintJob(String),

    // -- INTERNAL --
    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PrintBrokerError>;

/// Error classes from the taxonomy: which subsystem owns the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Auth,
    Quota,
    Input,
    Resource,
    Backend,
    Internal,
}

/// Wire-visible error code. Exactly the closed set the protocol defines;
/// adding a variant here is a protocol change, not a refactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    RateLimited,
    ValidationError,
    UnsupportedMessageType,
    FramingError,
    DuplicateJobId,
    PrintJobError,
    ServerError,
}

impl ErrorCode {
    /// The literal string placed in `data.error_code` on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::UnsupportedMessageType => "UNSUPPORTED_MESSAGE_TYPE",
            ErrorCode::FramingError => "FRAMING_ERROR",
            ErrorCode::DuplicateJobId => "DUPLICATE_JOB_ID",
            ErrorCode::PrintJobError => "PRINT_JOB_ERROR",
            ErrorCode::ServerError => "SERVER_ERROR",
        }
    }

    /// A fixed, non-parameterized message safe to send to any client.
    /// Never embeds the offending field value, a path, or an internal detail.
    pub fn client_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "authentication failed",
            ErrorCode::RateLimited => "rate limit exceeded",
            ErrorCode::ValidationError => "one or more fields failed validation",
            ErrorCode::UnsupportedMessageType => "unsupported message type",
            ErrorCode::FramingError => "malformed request frame",
            ErrorCode::DuplicateJobId => "a job with this id already exists",
            ErrorCode::PrintJobError => "the print job could not be completed",
            ErrorCode::ServerError => "internal server error",
        }
    }
}

impl PrintBrokerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PrintBrokerError::MissingToken
            | PrintBrokerError::TokenInvalid(_)
            | PrintBrokerError::TokenExpired => ErrorClass::Auth,
            PrintBrokerError::RateLimited { .. } => ErrorClass::Quota,
            PrintBrokerError::Validation { .. }
            | PrintBrokerError::Framing(_)
            | PrintBrokerError::UnsupportedMessageType(_) => ErrorClass::Input,
            PrintBrokerError::DuplicateJobId(_)
            | PrintBrokerError::Storage(_)
            | PrintBrokerError::Io(_) => ErrorClass::Resource,
            PrintBrokerError::PrintJob(_) => ErrorClass::Backend,
            PrintBrokerError::Internal(_) | PrintBrokerError::Serialization(_) => {
                ErrorClass::Internal
            }
        }
    }

    /// The wire error code a client should see for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            PrintBrokerError::MissingToken
            | PrintBrokerError::TokenInvalid(_)
            | PrintBrokerError::TokenExpired => ErrorCode::Unauthorized,
            PrintBrokerError::RateLimited { .. } => ErrorCode::RateLimited,
            PrintBrokerError::Validation { .. } => ErrorCode::ValidationError,
            PrintBrokerError::UnsupportedMessageType(_) => ErrorCode::UnsupportedMessageType,
            PrintBrokerError::Framing(_) => ErrorCode::FramingError,
            PrintBrokerError::DuplicateJobId(_) => ErrorCode::DuplicateJobId,
            PrintBrokerError::PrintJob(_) => ErrorCode::PrintJobError,
            PrintBrokerError::Storage(_)
            | PrintBrokerError::Io(_)
            | PrintBrokerError::Internal(_)
            | PrintBrokerError::Serialization(_) => ErrorCode::ServerError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_unauthorized() {
        assert_eq!(PrintBrokerError::MissingToken.code(), ErrorCode::Unauthorized);
        assert_eq!(
            PrintBrokerError::TokenExpired.code(),
            ErrorCode::Unauthorized
        );
        assert_eq!(
            PrintBrokerError::TokenInvalid("bad sig".into()).code(),
            ErrorCode::Unauthorized
        );
    }

    #[test]
    fn internal_errors_never_leak_detail_in_client_message() {
        let err = PrintBrokerError::Storage("disk full at /var/lib/printbroker/db".into());
        let msg = err.code().client_message();
        assert!(!msg.contains("/var"));
        assert!(!msg.contains("disk"));
    }

    #[test]
    fn validation_class_is_input() {
        let err = PrintBrokerError::Validation {
            field: "client_id".into(),
            reason: "too long".into(),
        };
        assert_eq!(err.class(), ErrorClass::Input);
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
