// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! The submission-time gauntlet: field validation, per-principal rate
//! limiting, bearer tokens, and password hashing.

pub mod auth;
pub mod rate_limiter;
pub mod validation;

pub use auth::{hash_password, verify_password, AuthManager, Claims};
pub use rate_limiter::RateLimiter;
