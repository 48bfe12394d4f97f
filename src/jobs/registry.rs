//! Pending-job map: `jobId → resolver + deadline timer` (§4.4, §9).
//!
//! The state machine is `Created → Running → (Completed | Failed |
//! TimedOut)`; terminal states are one-shot. Modeled as one-shot resolvers
//! removed from the map *before* invocation, breaking the cyclic reference
//! between job-completion callbacks and the pending-job map that the
//! source's promise-based job queue suffered from (§9).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::JobError;

/// Terminal outcome of a pending job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed { accepted: usize },
    Failed { reason: String },
    TimedOut,
}

/// In-process registry of outstanding async jobs (§4.4, §4.5).
#[derive(Clone)]
pub struct JobRegistry {
    pending: Arc<DashMap<Uuid, oneshot::Sender<JobOutcome>>>,
    max_pending: usize,
}

impl JobRegistry {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            max_pending,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a new async job would exceed the configured ceiling (§5
    /// backpressure: beyond this, new async calls degrade to synchronous).
    pub fn at_capacity(&self) -> bool {
        self.pending.len() >= self.max_pending
    }

    /// Register a new job and arm its deadline timer. Returns the job id
    /// and a receiver that resolves to the terminal outcome (`Completed`,
    /// `Failed`, or `TimedOut` on expiry).
    pub fn register(&self, timeout: Duration) -> (Uuid, oneshot::Receiver<JobOutcome>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let pending = self.pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, tx)) = pending.remove(&id) {
                let _ = tx.send(JobOutcome::TimedOut);
            }
        });

        (id, rx)
    }

    /// Resolve a pending job. Idempotent: completing an already-resolved
    /// (or timed-out) job is a no-op, satisfying the at-least-once delivery
    /// tolerance required of `job:complete` handlers (§5).
    pub fn complete(&self, id: Uuid, outcome: JobOutcome) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn job_timeout_error(id: Uuid, timeout: Duration) -> JobError {
        JobError::Timeout { id, timeout }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_job_resolves_receiver() {
        let registry = JobRegistry::new(100);
        let (id, rx) = registry.register(Duration::from_secs(30));
        assert!(registry.complete(id, JobOutcome::Completed { accepted: 2 }));
        match rx.await.unwrap() {
            JobOutcome::Completed { accepted } => assert_eq!(accepted, 2),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_resolves_to_timed_out_and_clears_map() {
        let registry = JobRegistry::new(100);
        let (_, rx) = registry.register(Duration::from_millis(10));
        match rx.await.unwrap() {
            JobOutcome::TimedOut => {}
            other => panic!("expected TimedOut, got {other:?}"),
        }
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn completing_unknown_job_is_a_no_op() {
        let registry = JobRegistry::new(100);
        assert!(!registry.complete(Uuid::new_v4(), JobOutcome::Completed { accepted: 0 }));
    }

    #[tokio::test]
    async fn double_complete_is_idempotent() {
        let registry = JobRegistry::new(100);
        let (id, _rx) = registry.register(Duration::from_secs(30));
        assert!(registry.complete(id, JobOutcome::Completed { accepted: 1 }));
        assert!(!registry.complete(id, JobOutcome::Completed { accepted: 1 }));
    }

    #[tokio::test]
    async fn at_capacity_reflects_ceiling() {
        let registry = JobRegistry::new(1);
        assert!(!registry.at_capacity());
        let (_id, _rx) = registry.register(Duration::from_secs(30));
        assert!(registry.at_capacity());
    }
}
