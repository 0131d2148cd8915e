//! Bounded, priority-ordered job queue.
//!
//! Ordering is strict tier priority first, FIFO within a priority level
//! (a monotonic sequence number breaks ties). Dequeue is cooperative:
//! workers park on a [`Notify`] until something is enqueued. An entry is
//! handed to exactly one claimant.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use prism_core::types::{JobId, UserId};

/// One admitted job waiting for a worker.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub user_id: UserId,
    /// Tier-derived priority; higher is served first.
    pub priority: u8,
}

/// Errors from queue admission.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is saturated ({0} entries)")]
    Saturated(usize),
}

/// What happened to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The entry was still queued and has been removed.
    Removed,
    /// The queue has never seen, or no longer tracks, this job.
    NotFound,
    /// A worker already claimed the entry; it cannot be pulled back.
    TooLate,
}

/// Sort key: highest priority first, then submission order.
type QueueKey = (Reverse<u8>, u64);

#[derive(Default)]
struct QueueState {
    entries: BTreeMap<QueueKey, QueuedJob>,
    index: std::collections::HashMap<JobId, QueueKey>,
    /// Jobs handed to a worker and not yet finished, so cancellation can
    /// distinguish "claimed" from "unknown".
    claimed: HashSet<JobId>,
    next_seq: u64,
}

/// Shared in-process queue between the facade and the worker pool.
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Admit a job. Returns the queue depth after insertion, or
    /// [`QueueError::Saturated`] without side effects when full.
    pub fn enqueue(&self, job: QueuedJob) -> Result<usize, QueueError> {
        let mut state = self.lock();
        if state.entries.len() >= self.capacity {
            return Err(QueueError::Saturated(state.entries.len()));
        }
        let key = (Reverse(job.priority), state.next_seq);
        state.next_seq += 1;
        state.index.insert(job.job_id, key);
        state.entries.insert(key, job);
        let depth = state.entries.len();
        drop(state);
        self.notify.notify_one();
        Ok(depth)
    }

    /// Take the highest-priority entry, waiting if the queue is empty.
    ///
    /// Returns `None` once `shutdown` fires. Each entry is handed out
    /// exactly once regardless of how many workers are waiting.
    pub async fn dequeue(&self, shutdown: &CancellationToken) -> Option<QueuedJob> {
        loop {
            if let Some(job) = self.try_dequeue() {
                return Some(job);
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Non-blocking claim of the front entry.
    pub fn try_dequeue(&self) -> Option<QueuedJob> {
        let mut state = self.lock();
        let (&key, _) = state.entries.iter().next()?;
        let job = state.entries.remove(&key)?;
        state.index.remove(&job.job_id);
        state.claimed.insert(job.job_id);
        let more = !state.entries.is_empty();
        drop(state);
        if more {
            // A single Notify permit can cover several enqueues; pass the
            // wakeup along so no worker sleeps next to a non-empty queue.
            self.notify.notify_one();
        }
        Some(job)
    }

    /// Pull a still-queued job back out.
    pub fn cancel(&self, job_id: JobId) -> CancelOutcome {
        let mut state = self.lock();
        if let Some(key) = state.index.remove(&job_id) {
            state.entries.remove(&key);
            return CancelOutcome::Removed;
        }
        if state.claimed.contains(&job_id) {
            return CancelOutcome::TooLate;
        }
        CancelOutcome::NotFound
    }

    /// Release the claim bookkeeping once a worker is done with a job.
    pub fn finish(&self, job_id: JobId) {
        self.lock().claimed.remove(&job_id);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // A panic while holding this mutex is already a bug; continuing
        // with the recovered state keeps the queue serviceable.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use uuid::Uuid;

    fn job(priority: u8) -> QueuedJob {
        QueuedJob {
            job_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            priority,
        }
    }

    #[test]
    fn higher_priority_is_served_first() {
        let queue = JobQueue::new(16);
        let free = job(0);
        let pro = job(2);
        let standard = job(1);
        queue.enqueue(free.clone()).unwrap();
        queue.enqueue(pro.clone()).unwrap();
        queue.enqueue(standard.clone()).unwrap();

        assert_eq!(queue.try_dequeue().unwrap().job_id, pro.job_id);
        assert_eq!(queue.try_dequeue().unwrap().job_id, standard.job_id);
        assert_eq!(queue.try_dequeue().unwrap().job_id, free.job_id);
    }

    #[test]
    fn fifo_within_a_priority_level() {
        let queue = JobQueue::new(16);
        let first = job(1);
        let second = job(1);
        queue.enqueue(first.clone()).unwrap();
        queue.enqueue(second.clone()).unwrap();

        assert_eq!(queue.try_dequeue().unwrap().job_id, first.job_id);
        assert_eq!(queue.try_dequeue().unwrap().job_id, second.job_id);
    }

    #[test]
    fn saturated_queue_rejects() {
        let queue = JobQueue::new(2);
        queue.enqueue(job(0)).unwrap();
        queue.enqueue(job(0)).unwrap();
        assert_matches!(queue.enqueue(job(3)), Err(QueueError::Saturated(2)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn cancel_outcomes() {
        let queue = JobQueue::new(16);
        let queued = job(0);
        let claimed = job(0);
        queue.enqueue(queued.clone()).unwrap();
        queue.enqueue(claimed.clone()).unwrap();

        // Claim one (FIFO: the first enqueued).
        assert_eq!(queue.try_dequeue().unwrap().job_id, queued.job_id);

        assert_eq!(queue.cancel(claimed.job_id), CancelOutcome::Removed);
        assert_eq!(queue.cancel(queued.job_id), CancelOutcome::TooLate);
        assert_eq!(queue.cancel(Uuid::new_v4()), CancelOutcome::NotFound);

        queue.finish(queued.job_id);
        assert_eq!(queue.cancel(queued.job_id), CancelOutcome::NotFound);
    }

    #[tokio::test]
    async fn dequeue_waits_for_work() {
        let queue = std::sync::Arc::new(JobQueue::new(16));
        let shutdown = CancellationToken::new();

        let waiter = {
            let queue = std::sync::Arc::clone(&queue);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.dequeue(&shutdown).await })
        };
        tokio::task::yield_now().await;

        let expected = job(0);
        queue.enqueue(expected.clone()).unwrap();
        let claimed = waiter.await.unwrap().unwrap();
        assert_eq!(claimed.job_id, expected.job_id);
    }

    #[tokio::test]
    async fn dequeue_returns_none_on_shutdown() {
        let queue = JobQueue::new(16);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(queue.dequeue(&shutdown).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_workers_never_share_an_entry() {
        let queue = std::sync::Arc::new(JobQueue::new(256));

        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            let entry = job(0);
            ids.insert(entry.job_id);
            queue.enqueue(entry).unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = std::sync::Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(entry) = queue.try_dequeue() {
                    claimed.push(entry.job_id);
                }
                claimed
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                // The same entry must never reach two claimants.
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen, ids);
        assert!(queue.is_empty());
    }
}
