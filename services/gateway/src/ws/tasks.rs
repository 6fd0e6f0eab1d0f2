//! Connection-scoped supervision of fire-and-forget work.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, warn};

/// Owns every background task spawned on behalf of one connection.
///
/// Nothing awaits these tasks on the hot path. Each one is bounded by a
/// timeout, its failure is logged here and never reaches the session loop,
/// and whatever is still running when the connection closes is given a grace
/// period and then aborted.
pub struct TaskSupervisor {
    tasks: JoinSet<()>,
    timeout: Duration,
}

impl TaskSupervisor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tasks: JoinSet::new(),
            timeout,
        }
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.reap();
        let timeout = self.timeout;
        self.tasks.spawn(
            async move {
                match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(())) => debug!(task = name, "background task finished"),
                    Ok(Err(e)) => warn!(task = name, error = ?e, "background task failed"),
                    Err(_) => warn!(task = name, ?timeout, "background task timed out"),
                }
            }
            .in_current_span(),
        );
    }

    /// Number of tasks not yet reaped.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Collects finished tasks so the set does not grow with the connection's lifetime.
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(error = ?e, "background task panicked");
                }
            }
        }
    }

    /// Waits up to `grace` for outstanding tasks, then aborts the rest.
    pub async fn shutdown(mut self, grace: Duration) {
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!(error = ?e, "background task panicked");
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "aborting background tasks of closed connection"
            );
            self.tasks.shutdown().await;
        }
    }
}
