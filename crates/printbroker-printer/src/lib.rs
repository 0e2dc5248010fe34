// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! The printer backend capability: `list`, `submit`, `status`. Two
//! variants are provided — a native OS spooler backend and an in-memory
//! mock used by tests and by any deployment without a physical printer
//! attached. Selection between them is a plain runtime branch made once
//! at boot from `PrinterConfig::use_mock`.

mod mock;
mod native;

pub use mock::MockBackend;
pub use native::NativeBackend;

use async_trait::async_trait;
use printbroker_core::PrintBrokerError;
use std::path::Path;

/// A snapshot of the backend's readiness, returned by `status()`.
#[derive(Debug, Clone)]
pub struct PrinterStatus {
    pub status: String,
    pub available: bool,
    pub message: Option<String>,
}

/// The capability the dispatcher drives: list known printers, submit a
/// resolved file for printing, and query readiness before submitting.
///
/// `submit` is specified as blocking, invoked only from the dispatcher's
/// worker loop; implementations that wrap a genuinely blocking call (the
/// native backend shells out synchronously) do so via
/// `tokio::task::spawn_blocking` internally so the trait itself stays
/// `async`.
#[async_trait]
pub trait PrinterBackend: Send + Sync {
    async fn list(&self) -> Result<Vec<String>, PrintBrokerError>;

    async fn submit(&self, path: &Path, copies: u32) -> Result<bool, PrintBrokerError>;

    async fn status(&self) -> Result<PrinterStatus, PrintBrokerError>;
}
