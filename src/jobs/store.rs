//! Write-once job state store.
//!
//! A job starts `Pending` and transitions exactly once to a terminal state
//! (`Done` or `Failed`). The transition is enforced with a single `DashMap`
//! entry mutation rather than a read-then-write pair, so two racing
//! finishers (the runner's deadline timer firing concurrently with the
//! underlying pipeline future completing) can't both "win".

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::auth::SessionIdentity;
use crate::model::SearchResponse;
use crate::pipeline::errors::PipelineErrorKind;

/// How long a terminal job stays fetchable before the sweeper reclaims it.
pub const JOB_RETENTION: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Done { response: SearchResponse },
    Failed { kind: PipelineErrorKind, message: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub request_id: String,
    pub owner: SessionIdentity,
    pub state: JobState,
    pub created_at: Instant,
    /// Set only once `state` becomes terminal; drives sweeper reclamation.
    pub terminal_at: Option<Instant>,
}

impl Job {
    fn new(request_id: String, owner: SessionIdentity) -> Self {
        Self { request_id, owner, state: JobState::Pending, created_at: Instant::now(), terminal_at: None }
    }
}

/// In-memory job table keyed by request id.
///
/// Single-process, matching scheduling model — there is no
/// cross-instance handoff for in-flight jobs.
#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<String, Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending job. Returns the generated request id.
    pub fn create(&self, owner: SessionIdentity) -> String {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.create_with_id(request_id.clone(), owner);
        request_id
    }

    /// Register a new pending job under a caller-chosen request id.
    /// Exposed for callers (and tests) that mint the id ahead of insertion,
    /// e.g. to resolve a [`crate::ws::pending::PendingSubscriptions`] race.
    pub fn create_with_id(&self, request_id: String, owner: SessionIdentity) {
        self.jobs.insert(request_id.clone(), Job::new(request_id, owner));
    }

    /// Fetch a job's current snapshot, regardless of ownership.
    ///
    /// Ownership checks happen at the API layer (IDOR-opacity
    /// decision in DESIGN.md) — this is the raw read path.
    pub fn get(&self, request_id: &str) -> Option<Job> {
        self.jobs.get(request_id).map(|e| e.clone())
    }

    /// Transition a job to `Done`. No-op (returns `false`) if the job is
    /// missing or already terminal — the write-once guarantee.
    pub fn complete(&self, request_id: &str, response: SearchResponse) -> bool {
        self.finish(request_id, JobState::Done { response })
    }

    /// Transition a job to `Failed`. Same write-once guarantee as
    /// [`JobStore::complete`].
    pub fn fail(&self, request_id: &str, kind: PipelineErrorKind, message: String) -> bool {
        self.finish(request_id, JobState::Failed { kind, message })
    }

    fn finish(&self, request_id: &str, new_state: JobState) -> bool {
        match self.jobs.get_mut(request_id) {
            Some(mut entry) if !entry.state.is_terminal() => {
                entry.state = new_state;
                entry.terminal_at = Some(Instant::now());
                true
            }
            _ => false,
        }
    }

    /// Remove terminal jobs older than [`JOB_RETENTION`]. Pending jobs are
    /// never swept here — [`crate::jobs::runner::AsyncRunner`] owns their
    /// deadline.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.jobs.retain(|_, job| match job.terminal_at {
            Some(t) => now.duration_since(t) < JOB_RETENTION,
            None => true,
        });
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }
}

/// Spawn the periodic sweeper as a background task. Runs until the process
/// exits; there is no cancellation handle because the store itself is
/// process-lifetime.
pub fn spawn_sweeper(store: Arc<JobStore>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            store.sweep_expired();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> SessionIdentity {
        SessionIdentity { session_id: "sess-1".into(), user_id: None }
    }

    #[test]
    fn create_then_get_returns_pending() {
        let store = JobStore::new();
        let id = store.create(owner());
        let job = store.get(&id).unwrap();
        assert!(matches!(job.state, JobState::Pending));
    }

    #[test]
    fn complete_is_write_once() {
        let store = JobStore::new();
        let id = store.create(owner());
        let resp = SearchResponse::empty("test", crate::model::FailureReason::LowConfidence);
        assert!(store.complete(&id, resp.clone()));
        assert!(!store.complete(&id, resp));
        assert!(!store.fail(&id, PipelineErrorKind::InternalError, "late".into()));
    }

    #[test]
    fn fail_then_complete_does_not_override() {
        let store = JobStore::new();
        let id = store.create(owner());
        assert!(store.fail(&id, PipelineErrorKind::PipelineTimeout, "timed out".into()));
        let resp = SearchResponse::empty("test", crate::model::FailureReason::LowConfidence);
        assert!(!store.complete(&id, resp));
        let job = store.get(&id).unwrap();
        assert!(matches!(job.state, JobState::Failed { .. }));
    }

    #[test]
    fn unknown_job_returns_none() {
        let store = JobStore::new();
        assert!(store.get("never-created").is_none());
    }

    #[test]
    fn sweep_never_removes_pending() {
        let store = JobStore::new();
        let id = store.create(owner());
        store.sweep_expired();
        assert!(store.get(&id).is_some());
    }
}
