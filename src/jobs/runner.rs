//! Detached execution of accepted jobs.
//!
//! Each job runs on its own `tokio::spawn`, racing the pipeline future
//! against a fixed deadline and an external abort signal. Exactly one of
//! the three outcomes (finish, deadline, abort) writes the job's terminal
//! state — [`crate::jobs::store::JobStore`]'s write-once guarantee makes the
//! race harmless if more than one fires close together.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::jobs::store::JobStore;
use crate::model::SearchResponse;
use crate::pipeline::errors::PipelineErrorKind;

/// Hard ceiling on a job's wall-clock run time.
pub const JOB_DEADLINE: Duration = Duration::from_secs(45);

pub type PipelineOutcome = Result<SearchResponse, (PipelineErrorKind, String)>;

/// Owns the abort handles for in-flight jobs and drives each one to a
/// terminal [`JobStore`] write.
pub struct AsyncRunner {
    store: Arc<JobStore>,
    tokens: DashMap<String, CancellationToken>,
    deadline: Duration,
}

impl AsyncRunner {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store, tokens: DashMap::new(), deadline: JOB_DEADLINE }
    }

    #[cfg(test)]
    fn with_deadline(store: Arc<JobStore>, deadline: Duration) -> Self {
        Self { store, tokens: DashMap::new(), deadline }
    }

    /// Spawn `fut` as the detached execution of `request_id`, racing it
    /// against the runner's deadline and an abort token registered for the
    /// lifetime of the run.
    pub fn spawn<F>(self: &Arc<Self>, request_id: String, fut: F)
    where
        F: Future<Output = PipelineOutcome> + Send + 'static,
    {
        let token = CancellationToken::new();
        self.tokens.insert(request_id.clone(), token.clone());

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = tokio::time::timeout(this.deadline, fut) => Some(result),
            };

            this.tokens.remove(&request_id);

            match outcome {
                None => {
                    this.store.fail(
                        &request_id,
                        PipelineErrorKind::InternalError,
                        "job aborted".to_string(),
                    );
                }
                Some(Err(_elapsed)) => {
                    warn!(request_id = %request_id, "job exceeded deadline");
                    this.store.fail(
                        &request_id,
                        PipelineErrorKind::PipelineTimeout,
                        "job exceeded its deadline".to_string(),
                    );
                }
                Some(Ok(Ok(response))) => {
                    this.store.complete(&request_id, response);
                }
                Some(Ok(Err((kind, message)))) => {
                    this.store.fail(&request_id, kind, message);
                }
            }
        });
    }

    /// Abort a running job, if still in flight. Idempotent.
    pub fn abort(&self, request_id: &str) {
        if let Some((_, token)) = self.tokens.remove(request_id) {
            token.cancel();
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.tokens.len()
    }

    /// Wait for in-flight jobs to reach their own terminal write (success,
    /// failure, or deadline) before the process exits, so a detached job's
    /// `finally`-equivalent cleanup always runs instead of being cut off by
    /// a dropped task. Gives up and returns once `timeout` elapses, letting
    /// the caller shut down regardless.
    pub async fn drain(&self, timeout: Duration) {
        let start = tokio::time::Instant::now();
        while self.in_flight_count() > 0 {
            if start.elapsed() >= timeout {
                warn!(remaining = self.in_flight_count(), "shutdown timed out waiting for in-flight jobs to drain");
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
