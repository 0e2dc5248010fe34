// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! The single-writer dispatch loop: dequeue the highest-priority pending
//! job, drive it through the printer backend, and apply the
//! `pending → printing → terminal` transition. The dispatcher is the sole
//! writer of those three states — the request handler only ever writes
//! `pending` on admission, and an external admin action is the only other
//! writer of `cancelled`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use printbroker_core::{JobStatus, PrintBrokerError, PrintJob};
use printbroker_printer::PrinterBackend;
use printbroker_queue::{still_pending, PriorityQueue, QueueEntry};
use printbroker_store::{JobPatch, JobStore};
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

/// How long a job in `printing` has to live before a submission is
/// considered. Not itself a deadline — just the interval the dispatcher
/// polls the queue with, so a shutdown request is noticed promptly.
pub const DEFAULT_POLL_TIMEOUT: StdDuration = StdDuration::from_millis(500);

/// Drives jobs from the priority queue to a printer backend.
///
/// One dispatcher instance corresponds to one physical printer (§4.8); a
/// deployment with more printers runs one dispatcher per backend, all
/// sharing the same `PriorityQueue` and `JobStore`.
pub struct Dispatcher {
    store: Arc<JobStore>,
    queue: Arc<PriorityQueue>,
    backend: Arc<dyn PrinterBackend>,
    temp_folder: PathBuf,
    poll_timeout: StdDuration,
    shutdown: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        queue: Arc<PriorityQueue>,
        backend: Arc<dyn PrinterBackend>,
        temp_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            queue,
            backend,
            temp_folder: temp_folder.into(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn with_poll_timeout(mut self, timeout: StdDuration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// A handle that `main` can hold onto and call to request a graceful
    /// stop; the loop finishes whatever job it is mid-processing first.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Runs until `shutdown_handle().notify_one()` is called. Jobs still
    /// sitting in the queue when the loop exits are left there — they are
    /// already `pending` in the store, so the next boot's
    /// `PriorityQueue::restore_from_store` picks them back up unchanged.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!("dispatcher starting");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    let remaining = self.queue.size();
                    info!(remaining, "dispatcher shutting down, remaining jobs stay pending");
                    break;
                }
                popped = self.queue.pop_timeout(self.poll_timeout) => {
                    if let Some(entry) = popped {
                        self.process_one(entry).await;
                    }
                }
            }
        }
    }

    #[instrument(skip(self, entry), fields(job_id = %entry.job_id))]
    async fn process_one(&self, entry: QueueEntry) {
        let job = match self.store.get_job(&entry.job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("dequeued job no longer exists in the store");
                return;
            }
            Err(err) => {
                error!(%err, "failed to load dequeued job");
                return;
            }
        };

        if !still_pending(job.status) {
            debug!(status = job.status.as_str(), "skipping job no longer pending (cancel race)");
            return;
        }

        let started_at = Utc::now();
        if let Err(err) = self.store.update_job(
            &entry.job_id,
            JobPatch::default().status(JobStatus::Printing).started_at(started_at),
        ) {
            error!(%err, "failed to mark job printing");
            return;
        }

        let path = self.temp_folder.join(format!("{}.{}", job.job_id, job.file_format));
        if !path_exists(&path).await {
            self.fail_permanently(&job, "print artifact missing from temp storage");
            return;
        }

        match self.backend.status().await {
            Ok(status) if !status.available => {
                self.requeue_transient(&entry, &job, "printer backend unavailable");
                return;
            }
            Err(err) => {
                warn!(%err, "printer status check failed, treating backend as unavailable");
                self.requeue_transient(&entry, &job, "printer status check failed");
                return;
            }
            Ok(_) => {}
        }

        match self.backend.submit(&path, job.copies).await {
            Ok(true) => self.complete(&job, started_at).await,
            Ok(false) => self.retry_or_fail(&job, "print submission was rejected by the backend"),
            Err(err) => {
                warn!(%err, "print submission errored");
                self.retry_or_fail(&job, "print submission failed");
            }
        }
    }

    /// A permanent, non-retryable failure (the resolved file is missing).
    fn fail_permanently(&self, job: &PrintJob, reason: &str) {
        let completed_at = Utc::now();
        if let Err(err) = self.store.update_job(
            &job.job_id.to_string(),
            JobPatch::default()
                .status(JobStatus::Failed)
                .completed_at(completed_at)
                .error_message(reason),
        ) {
            error!(%err, "failed to record permanent job failure");
        }
        self.record_terminal_stat(job, JobStatus::Failed, 0);
    }

    /// Printer offline pre-submit: re-enqueue at the same priority without
    /// counting it as a retry attempt (§4.8 step 3).
    fn requeue_transient(&self, entry: &QueueEntry, job: &PrintJob, reason: &str) {
        if let Err(err) = self.store.update_job(
            &job.job_id.to_string(),
            JobPatch::default().status(JobStatus::Pending).error_message(reason),
        ) {
            error!(%err, "failed to record transient backend failure");
            return;
        }
        self.queue.push(job.job_id.to_string(), job.priority, entry.enqueue_time);
        self.queue.renumber_positions(&self.store);
    }

    async fn complete(&self, job: &PrintJob, started_at: chrono::DateTime<Utc>) {
        let completed_at = Utc::now();
        let processing_time_ms = (completed_at - started_at).num_milliseconds().max(0);
        if let Err(err) = self.store.update_job(
            &job.job_id.to_string(),
            JobPatch::default()
                .status(JobStatus::Completed)
                .completed_at(completed_at)
                .processing_time_ms(processing_time_ms)
                .clear_error_message(),
        ) {
            error!(%err, "failed to record job completion");
            return;
        }
        if let Err(err) = self.store.increment_client(&job.client_id, 1, job.page_count as u64) {
            error!(%err, "failed to update client counters");
        }
        self.record_terminal_stat(job, JobStatus::Completed, processing_time_ms);
    }

    /// On failure: retry with `priority = min(10, priority+1)` if budget
    /// remains (§9's pinned answer to the retry/priority open question),
    /// else terminal `failed`.
    fn retry_or_fail(&self, job: &PrintJob, reason: &str) {
        if job.retry_count < job.max_retries {
            let new_priority = (job.priority + 1).min(10);
            if let Err(err) = self.store.update_job(
                &job.job_id.to_string(),
                JobPatch::default()
                    .status(JobStatus::Pending)
                    .retry_count(job.retry_count + 1)
                    .priority(new_priority)
                    .error_message(reason),
            ) {
                error!(%err, "failed to record retry");
                return;
            }
            self.queue.push(job.job_id.to_string(), new_priority, Utc::now());
            self.queue.renumber_positions(&self.store);
        } else {
            let completed_at = Utc::now();
            if let Err(err) = self.store.update_job(
                &job.job_id.to_string(),
                JobPatch::default()
                    .status(JobStatus::Failed)
                    .completed_at(completed_at)
                    .error_message(reason),
            ) {
                error!(%err, "failed to record exhausted-retry failure");
                return;
            }
            self.record_terminal_stat(job, JobStatus::Failed, 0);
        }
    }

    fn record_terminal_stat(&self, job: &PrintJob, status: JobStatus, processing_time_ms: i64) {
        let (completed, failed, cancelled, pages) = match status {
            JobStatus::Completed => (1, 0, 0, job.page_count as u64),
            JobStatus::Failed => (0, 1, 0, 0),
            JobStatus::Cancelled => (0, 0, 1, 0),
            _ => return,
        };
        if let Err(err) = self.store.record_daily_stat(
            Utc::now().date_naive(),
            completed,
            failed,
            cancelled,
            pages,
            processing_time_ms,
        ) {
            error!(%err, "failed to record daily stat");
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Thrown only by tests that need to assert on a `PrintBrokerError` without
/// depending on a real I/O failure.
#[allow(dead_code)]
fn assert_error_is_resource(err: &PrintBrokerError) -> bool {
    matches!(err, PrintBrokerError::Storage(_) | PrintBrokerError::Io(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use printbroker_core::{Margins, Orientation, PageSize, Quality};
    use printbroker_printer::MockBackend;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_job(store: &JobStore, temp_dir: &Path, priority: u8) -> PrintJob {
        store.upsert_client("client-1", "10.0.0.5", None).unwrap();
        let job = PrintJob::new(
            "client-1",
            "alice",
            "report.pdf",
            "pdf",
            512,
            3,
            PageSize::A4,
            Orientation::Portrait,
            1,
            false,
            false,
            Quality::Normal,
            Margins::default(),
            priority,
        );
        store.create_job(&job).unwrap();
        std::fs::write(temp_dir.join(format!("{}.pdf", job.job_id)), b"%PDF-1.4\n%%EOF").unwrap();
        job
    }

    async fn run_until_drained(dispatcher: &Dispatcher, queue: &PriorityQueue) {
        for _ in 0..200 {
            if queue.size() == 0 {
                // give the in-flight process_one call a moment to land its write
                tokio::time::sleep(StdDuration::from_millis(5)).await;
                return;
            }
            if let Some(entry) = queue.pop_timeout(StdDuration::from_millis(20)).await {
                dispatcher.process_one(entry).await;
            }
        }
    }

    #[tokio::test]
    async fn completes_a_job_that_submits_successfully() {
        let store = Arc::new(JobStore::open_in_memory().unwrap());
        let queue = Arc::new(PriorityQueue::new());
        let temp_dir = TempDir::new().unwrap();
        let backend: Arc<dyn PrinterBackend> = Arc::new(MockBackend::new());

        let job = test_job(&store, temp_dir.path(), 5);
        queue.push(job.job_id.to_string(), job.priority, job.created_at);

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), backend, temp_dir.path());
        run_until_drained(&dispatcher, &queue).await;

        let stored = store.get_job(&job.job_id.to_string()).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.processing_time_ms.unwrap() >= 0);
        let client = store.get_client("client-1").unwrap().unwrap();
        assert_eq!(client.total_jobs, 1);
        assert_eq!(client.total_pages, 3);
    }

    #[tokio::test]
    async fn retries_exactly_max_retries_times_then_succeeds() {
        let store = Arc::new(JobStore::open_in_memory().unwrap());
        let queue = Arc::new(PriorityQueue::new());
        let temp_dir = TempDir::new().unwrap();
        let backend: Arc<dyn PrinterBackend> = Arc::new(MockBackend::new().fail_next_n_submits(3));

        let job = test_job(&store, temp_dir.path(), 5);
        queue.push(job.job_id.to_string(), job.priority, job.created_at);

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), backend, temp_dir.path());
        run_until_drained(&dispatcher, &queue).await;

        let stored = store.get_job(&job.job_id.to_string()).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.retry_count, 3);
    }

    #[tokio::test]
    async fn exhausting_retries_lands_in_failed() {
        let store = Arc::new(JobStore::open_in_memory().unwrap());
        let queue = Arc::new(PriorityQueue::new());
        let temp_dir = TempDir::new().unwrap();
        let backend: Arc<dyn PrinterBackend> = Arc::new(MockBackend::new().always_fail());

        let job = test_job(&store, temp_dir.path(), 5);
        queue.push(job.job_id.to_string(), job.priority, job.created_at);

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), backend, temp_dir.path());
        run_until_drained(&dispatcher, &queue).await;

        let stored = store.get_job(&job.job_id.to_string()).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.retry_count, stored.max_retries);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn cancelled_job_is_skipped_not_submitted() {
        let store = Arc::new(JobStore::open_in_memory().unwrap());
        let queue = Arc::new(PriorityQueue::new());
        let temp_dir = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::new());

        let job = test_job(&store, temp_dir.path(), 5);
        let entry = QueueEntry_for_test(job.job_id.to_string(), job.priority, job.created_at);
        // Race: an admin cancels the job after it is popped from the queue
        // but before the dispatcher gets to process it.
        store
            .update_job(&job.job_id.to_string(), JobPatch::default().status(JobStatus::Cancelled))
            .unwrap();

        let dispatcher = Dispatcher::new(
            store.clone(),
            queue.clone(),
            backend.clone() as Arc<dyn PrinterBackend>,
            temp_dir.path(),
        );
        dispatcher.process_one(entry).await;

        assert_eq!(backend.submission_count(), 0);
        let stored = store.get_job(&job.job_id.to_string()).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn missing_file_fails_without_retry() {
        let store = Arc::new(JobStore::open_in_memory().unwrap());
        let queue = Arc::new(PriorityQueue::new());
        let temp_dir = TempDir::new().unwrap();
        let backend: Arc<dyn PrinterBackend> = Arc::new(MockBackend::new());

        // A job whose payload was never (or no longer) on disk.
        let job = PrintJob::new(
            "client-1", "alice", "ghost.pdf", "pdf", 1, 1, PageSize::A4, Orientation::Portrait,
            1, false, false, Quality::Normal, Margins::default(), 5,
        );
        store.create_job(&job).unwrap();
        queue.push(job.job_id.to_string(), job.priority, job.created_at);

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), backend, temp_dir.path());
        run_until_drained(&dispatcher, &queue).await;

        let stored = store.get_job(&job.job_id.to_string()).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn backend_offline_requeues_without_counting_as_retry() {
        let store = Arc::new(JobStore::open_in_memory().unwrap());
        let queue = Arc::new(PriorityQueue::new());
        let temp_dir = TempDir::new().unwrap();
        let backend: Arc<dyn PrinterBackend> = Arc::new(MockBackend::new().unavailable());

        let job = test_job(&store, temp_dir.path(), 5);
        let entry = QueueEntry_for_test(job.job_id.to_string(), job.priority, job.created_at);

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), backend, temp_dir.path());
        dispatcher.process_one(entry).await;

        let stored = store.get_job(&job.job_id.to_string()).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(queue.size(), 1);
    }

    // `QueueEntry`'s fields are crate-visible only (its `seq` tiebreaker is
    // private); tests build one the same way the queue's own module does,
    // via push+pop, to avoid depending on private construction.
    #[allow(non_snake_case)]
    fn QueueEntry_for_test(job_id: String, priority: u8, enqueue_time: chrono::DateTime<Utc>) -> QueueEntry {
        let q = PriorityQueue::new();
        q.push(job_id, priority, enqueue_time);
        q.try_pop().unwrap()
    }
}
