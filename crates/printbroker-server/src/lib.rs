// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! The printbroker server binary's library surface: configuration
//! loading, the TLS listener, and the request handler. Split out of
//! `main.rs` so integration tests can drive `handle_connection` directly
//! without a real TLS handshake.

pub mod config_loader;
pub mod handler;
pub mod tls;

pub use handler::AppState;
