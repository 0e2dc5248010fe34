// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! The in-memory priority queue over pending jobs. It holds only
//! identifiers and scheduling hints — the job store (`printbroker-store`)
//! remains the sole owner of durable state. On crash recovery the queue
//! is rebuilt from whatever the store reports `pending`.

use chrono::{DateTime, Utc};
use printbroker_core::{JobStatus, PrintBrokerError};
use printbroker_store::{JobPatch, JobStore};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{debug, info, instrument};

/// One admitted job: enough to order it and to look the rest up in the
/// store. `seq` breaks ties between jobs enqueued in the same instant,
/// guaranteeing FIFO at equal priority regardless of clock resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: String,
    pub priority: u8,
    pub enqueue_time: DateTime<Utc>,
    seq: u64,
}

impl Ord for QueueEntry {
    /// Ascending priority, then ascending sequence — but `BinaryHeap` is a
    /// max-heap, so this is reversed and wrapped for `pop()` to yield the
    /// smallest `(priority, seq)` pair first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Thread-safe min-heap over pending jobs, ordered `(priority ASC,
/// enqueue_time ASC)`. Blocking pop is exposed as an async method backed
/// by a `Notify`, so a dispatcher task can await it without spinning.
pub struct PriorityQueue {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    notify: Notify,
    seq_counter: AtomicU64,
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            seq_counter: AtomicU64::new(0),
        }
    }

    /// Rebuilds the queue from every `pending` job the store reports,
    /// in `(priority ASC, created_at ASC)` order (run at boot).
    #[instrument(skip(self, store))]
    pub fn restore_from_store(&self, store: &JobStore) -> Result<usize, PrintBrokerError> {
        let pending = store.pending_jobs(u32::MAX)?;
        let mut heap = self.heap.lock().expect("queue mutex poisoned");
        heap.clear();
        let count = pending.len();
        for job in pending {
            let seq = self.seq_counter.fetch_add(1, AtomicOrdering::Relaxed);
            heap.push(QueueEntry {
                job_id: job.job_id.to_string(),
                priority: job.priority,
                enqueue_time: job.created_at,
                seq,
            });
        }
        info!(restored = count, "priority queue restored from store");
        Ok(count)
    }

    /// Pushes a newly admitted job. Notifies exactly one waiting popper.
    pub fn push(&self, job_id: impl Into<String>, priority: u8, enqueue_time: DateTime<Utc>) {
        let seq = self.seq_counter.fetch_add(1, AtomicOrdering::Relaxed);
        let entry = QueueEntry {
            job_id: job_id.into(),
            priority,
            enqueue_time,
            seq,
        };
        {
            let mut heap = self.heap.lock().expect("queue mutex poisoned");
            heap.push(entry);
        }
        self.notify.notify_one();
    }

    /// Pops the highest-priority entry if one is ready immediately,
    /// otherwise `None` without waiting.
    pub fn try_pop(&self) -> Option<QueueEntry> {
        self.heap.lock().expect("queue mutex poisoned").pop()
    }

    /// Waits up to `timeout` for an entry, returning `None` on timeout so
    /// the dispatcher can re-check its shutdown signal promptly.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<QueueEntry> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(entry) = self.try_pop() {
                return Some(entry);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let notified = self.notify.notified();
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return None;
            }
        }
    }

    pub fn size(&self) -> usize {
        self.heap.lock().expect("queue mutex poisoned").len()
    }

    /// Empties the queue, returning every remaining entry. Used on
    /// shutdown — each drained entry stays `pending` in the store, so the
    /// next boot's `restore_from_store` picks it back up.
    pub fn drain(&self) -> Vec<QueueEntry> {
        let mut heap = self.heap.lock().expect("queue mutex poisoned");
        let mut out = Vec::with_capacity(heap.len());
        while let Some(entry) = heap.pop() {
            out.push(entry);
        }
        out
    }

    /// Renumbers every member's advisory `queue_position` in the store by
    /// current pop order (1-based). Best-effort: a failure updating one
    /// job's position does not stop the renumbering of the rest.
    pub fn renumber_positions(&self, store: &JobStore) {
        let snapshot: Vec<QueueEntry> = {
            let heap = self.heap.lock().expect("queue mutex poisoned");
            heap.iter().cloned().collect()
        };
        let mut ordered = snapshot;
        ordered.sort();
        ordered.reverse(); // QueueEntry's Ord is reversed for the max-heap; undo it for display order.

        for (idx, entry) in ordered.iter().enumerate() {
            let position = (idx + 1) as u32;
            if let Err(err) = store.update_job(
                &entry.job_id,
                JobPatch::default().queue_position(Some(position)),
            ) {
                debug!(job_id = %entry.job_id, error = %err, "failed to refresh advisory queue_position");
            }
        }
    }

    /// The 1-based position `job_id` would have if popped right now, or
    /// `None` if it is not currently queued. `O(n log n)` — intended for
    /// the admission-time response only, not hot-path scheduling.
    pub fn position_of(&self, job_id: &str) -> Option<u32> {
        let heap = self.heap.lock().expect("queue mutex poisoned");
        let mut ordered: Vec<&QueueEntry> = heap.iter().collect();
        ordered.sort();
        ordered.reverse();
        ordered
            .iter()
            .position(|e| e.job_id == job_id)
            .map(|idx| (idx + 1) as u32)
    }

    /// Drops a specific job from the queue without popping the rest —
    /// used when an admin cancels a still-pending job out from under the
    /// scheduler. A no-op if the job is not currently queued (e.g. it was
    /// already popped for dispatch).
    pub fn remove(&self, job_id: &str) -> bool {
        let mut heap = self.heap.lock().expect("queue mutex poisoned");
        let before = heap.len();
        let remaining: Vec<QueueEntry> = heap.drain().filter(|e| e.job_id != job_id).collect();
        let removed = remaining.len() != before;
        *heap = BinaryHeap::from(remaining);
        removed
    }
}

/// Asserts a popped job is still eligible for dispatch: the dispatcher
/// must skip jobs whose store status raced to something other than
/// `pending` (an admin cancel that beat the dequeue).
pub fn still_pending(status: JobStatus) -> bool {
    status == JobStatus::Pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use printbroker_core::{Margins, Orientation, PageSize, PrintJob, Quality};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn pops_in_priority_then_fifo_order() {
        let queue = PriorityQueue::new();
        queue.push("job-10", 10, now());
        queue.push("job-1a", 1, now());
        queue.push("job-5", 5, now());
        queue.push("job-1b", 1, now());

        let order: Vec<String> = std::iter::from_fn(|| queue.try_pop().map(|e| e.job_id)).collect();
        assert_eq!(order, vec!["job-1a", "job-1b", "job-5", "job-10"]);
    }

    #[tokio::test]
    async fn pop_timeout_returns_none_when_empty() {
        let queue = PriorityQueue::new();
        let result = queue.pop_timeout(Duration::from_millis(20)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn pop_timeout_wakes_on_push() {
        let queue = std::sync::Arc::new(PriorityQueue::new());
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push("job-x", 3, now());
        let result = popper.await.unwrap();
        assert_eq!(result.unwrap().job_id, "job-x");
    }

    #[test]
    fn drain_empties_queue_and_returns_all_entries() {
        let queue = PriorityQueue::new();
        queue.push("a", 1, now());
        queue.push("b", 2, now());
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn remove_drops_only_named_job() {
        let queue = PriorityQueue::new();
        queue.push("a", 1, now());
        queue.push("b", 1, now());
        assert!(queue.remove("a"));
        assert!(!queue.remove("a"));
        let remaining: Vec<String> = std::iter::from_fn(|| queue.try_pop().map(|e| e.job_id)).collect();
        assert_eq!(remaining, vec!["b"]);
    }

    #[test]
    fn position_of_reflects_pop_order() {
        let queue = PriorityQueue::new();
        queue.push("low", 1, now());
        queue.push("high", 10, now());
        assert_eq!(queue.position_of("low"), Some(1));
        assert_eq!(queue.position_of("high"), Some(2));
        assert_eq!(queue.position_of("missing"), None);
    }

    #[test]
    fn restore_from_store_preserves_priority_order() {
        let store = JobStore::open_in_memory().unwrap();
        let mut j1 = PrintJob::new(
            "c", "u", "a.pdf", "pdf", 1, 1, PageSize::A4, Orientation::Portrait, 1, false, false,
            Quality::Normal, Margins::default(), 10,
        );
        let mut j2 = PrintJob::new(
            "c", "u", "b.pdf", "pdf", 1, 1, PageSize::A4, Orientation::Portrait, 1, false, false,
            Quality::Normal, Margins::default(), 1,
        );
        j1.created_at = now();
        j2.created_at = now();
        store.create_job(&j1).unwrap();
        store.create_job(&j2).unwrap();

        let queue = PriorityQueue::new();
        let restored = queue.restore_from_store(&store).unwrap();
        assert_eq!(restored, 2);
        assert_eq!(queue.try_pop().unwrap().job_id, j2.job_id.to_string());
        assert_eq!(queue.try_pop().unwrap().job_id, j1.job_id.to_string());
    }
}
