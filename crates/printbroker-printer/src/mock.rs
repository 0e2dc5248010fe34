// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory printer backend for tests and for deployments with no
// physical printer attached. Records every submission in order so test
// suites can assert on call sequencing (e.g. priority-order dispatch).

use async_trait::async_trait;
use printbroker_core::PrintBrokerError;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{PrinterBackend, PrinterStatus};

/// One recorded call to `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub path: PathBuf,
    pub copies: u32,
}

/// A deterministic, in-memory stand-in for a physical printer.
///
/// `fail_next_n_submits` lets a test script a transient failure run (e.g.
/// "fails 3 times then succeeds", §8 S5) without wiring a real backend.
pub struct MockBackend {
    submissions: Mutex<Vec<RecordedSubmission>>,
    remaining_failures: Mutex<u32>,
    always_fail: bool,
    available: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            remaining_failures: Mutex::new(0),
            always_fail: false,
            available: true,
        }
    }

    /// Builder: the first `n` calls to `submit` return `Ok(false)`; calls
    /// after that succeed.
    pub fn fail_next_n_submits(mut self, n: u32) -> Self {
        self.remaining_failures = Mutex::new(n);
        self
    }

    /// Builder: every call to `submit` returns `Ok(false)`.
    pub fn always_fail(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// Builder: `status()` reports the backend as unavailable.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Every submission recorded so far, in call order.
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().expect("mock backend mutex poisoned").clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().expect("mock backend mutex poisoned").len()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrinterBackend for MockBackend {
    async fn list(&self) -> Result<Vec<String>, PrintBrokerError> {
        Ok(vec!["mock-printer".to_string()])
    }

    async fn submit(&self, path: &Path, copies: u32) -> Result<bool, PrintBrokerError> {
        self.submissions
            .lock()
            .expect("mock backend mutex poisoned")
            .push(RecordedSubmission {
                path: path.to_path_buf(),
                copies,
            });

        if self.always_fail {
            return Ok(false);
        }

        let mut remaining = self.remaining_failures.lock().expect("mock backend mutex poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    async fn status(&self) -> Result<PrinterStatus, PrintBrokerError> {
        Ok(PrinterStatus {
            status: if self.available { "ready".to_string() } else { "offline".to_string() },
            available: self.available,
            message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_submissions_in_order() {
        let backend = MockBackend::new();
        backend.submit(Path::new("/tmp/a.pdf"), 1).await.unwrap();
        backend.submit(Path::new("/tmp/b.pdf"), 2).await.unwrap();
        let subs = backend.submissions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].path, PathBuf::from("/tmp/a.pdf"));
        assert_eq!(subs[1].copies, 2);
    }

    #[tokio::test]
    async fn fails_exactly_n_times_then_succeeds() {
        let backend = MockBackend::new().fail_next_n_submits(3);
        for _ in 0..3 {
            assert!(!backend.submit(Path::new("/tmp/x.pdf"), 1).await.unwrap());
        }
        assert!(backend.submit(Path::new("/tmp/x.pdf"), 1).await.unwrap());
    }

    #[tokio::test]
    async fn always_fail_never_succeeds() {
        let backend = MockBackend::new().always_fail();
        for _ in 0..10 {
            assert!(!backend.submit(Path::new("/tmp/x.pdf"), 1).await.unwrap());
        }
    }

    #[tokio::test]
    async fn status_reflects_availability_builder() {
        let backend = MockBackend::new().unavailable();
        let status = backend.status().await.unwrap();
        assert!(!status.available);
    }
}
