// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! Shared types, error taxonomy, and configuration for the print broker.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, SecurityConfig, ServerConfig};
pub use error::{ErrorClass, ErrorCode, PrintBrokerError, Result};
pub use types::*;
