// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OS-native spooler backend, shelling out to the platform's `lp`/`lpstat`
// CLI (CUPS on Linux/macOS). Windows is out of scope for this backend —
// deployments targeting it select the mock backend or supply their own.

use async_trait::async_trait;
use printbroker_core::PrintBrokerError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{instrument, warn};

use crate::{PrinterBackend, PrinterStatus};

/// Drives the system print spooler via `lp`/`lpstat`. `printer_name`
/// pins submissions to one named queue; `None` defers to the spooler's
/// configured default.
pub struct NativeBackend {
    printer_name: Option<String>,
}

impl NativeBackend {
    pub fn new(printer_name: Option<String>) -> Self {
        Self { printer_name }
    }

    fn run_blocking(
        mut command: Command,
        context: &'static str,
    ) -> Result<std::process::Output, PrintBrokerError> {
        command
            .output()
            .map_err(|e| PrintBrokerError::PrintJob(format!("{context}: {e}")))
    }
}

#[async_trait]
impl PrinterBackend for NativeBackend {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<String>, PrintBrokerError> {
        tokio::task::spawn_blocking(|| {
            let mut cmd = Command::new("lpstat");
            cmd.arg("-p");
            let output = Self::run_blocking(cmd, "lpstat -p")?;
            if !output.status.success() {
                return Err(PrintBrokerError::PrintJob(
                    "lpstat -p exited with a non-zero status".into(),
                ));
            }
            let stdout = String::from_utf8_lossy(&output.stdout);
            let names = stdout
                .lines()
                .filter_map(|line| line.strip_prefix("printer "))
                .filter_map(|rest| rest.split_whitespace().next())
                .map(str::to_string)
                .collect();
            Ok(names)
        })
        .await
        .map_err(|e| PrintBrokerError::Internal(format!("lpstat task join: {e}")))?
    }

    #[instrument(skip(self, path))]
    async fn submit(&self, path: &Path, copies: u32) -> Result<bool, PrintBrokerError> {
        let path: PathBuf = path.to_path_buf();
        let printer_name = self.printer_name.clone();
        tokio::task::spawn_blocking(move || {
            let mut cmd = Command::new("lp");
            if let Some(name) = &printer_name {
                cmd.arg("-d").arg(name);
            }
            cmd.arg("-n").arg(copies.to_string());
            cmd.arg(&path);
            let output = Self::run_blocking(cmd, "lp submit")?;
            if !output.status.success() {
                warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "lp submission failed"
                );
                return Ok(false);
            }
            Ok(true)
        })
        .await
        .map_err(|e| PrintBrokerError::Internal(format!("lp task join: {e}")))?
    }

    #[instrument(skip(self))]
    async fn status(&self) -> Result<PrinterStatus, PrintBrokerError> {
        let printer_name = self.printer_name.clone();
        tokio::task::spawn_blocking(move || {
            let mut cmd = Command::new("lpstat");
            if let Some(name) = &printer_name {
                cmd.arg("-p").arg(name);
            } else {
                cmd.arg("-d");
            }
            let output = Self::run_blocking(cmd, "lpstat status")?;
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(PrinterStatus {
                status: if output.status.success() {
                    "ready".to_string()
                } else {
                    "unavailable".to_string()
                },
                available: output.status.success(),
                message: Some(stdout),
            })
        })
        .await
        .map_err(|e| PrintBrokerError::Internal(format!("lpstat task join: {e}")))?
    }
}
