//! Fire-and-forget background tasks.
//!
//! Index maintenance (TTL resync, lazy prune) runs off the caller's path: the
//! triggering operation returns before the task finishes, and a task's failure is
//! logged rather than raised. Every task is idempotent, so a failed one is simply
//! retried by the next operation that schedules it.
//!
//! [`BackgroundTasks`] counts tasks in flight so callers (and tests) can wait for
//! the index to settle.

use crate::error::Result;
use crate::metrics::BACKGROUND_TASK_FAILURES_TOTAL;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Tracker for spawned index-maintenance tasks.
///
/// Cheap to clone; clones share the same counter.
#[derive(Clone)]
pub struct BackgroundTasks {
    in_flight: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl BackgroundTasks {
    /// Create a tracker with no tasks in flight.
    #[must_use]
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(());
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            notifier: Arc::new(notifier),
        }
    }

    /// Number of tasks spawned but not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Spawn `future` on the current Tokio runtime without waiting for it.
    ///
    /// Errors are logged under `task`. Outside a Tokio runtime the task is
    /// skipped with a warning.
    pub fn spawn<F>(&self, task: &'static str, future: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(task, "No Tokio runtime available, skipping background task");
            return;
        };

        self.increment();
        let guard = DecrementGuard(self.clone());

        runtime.spawn(async move {
            let _guard = guard; // Decrement on drop, even if the task panics

            if let Err(e) = future.await {
                metrics::counter!(BACKGROUND_TASK_FAILURES_TOTAL, "task" => task).increment(1);
                tracing::warn!(task, error = %e, "Background task failed");
            }
        });
    }

    /// Wait until no task is in flight.
    ///
    /// Tasks spawned while waiting are waited for as well.
    pub async fn wait_idle(&self) {
        let mut completion = self.notifier.subscribe();

        while self.in_flight() > 0 {
            if completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait until no task is in flight, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the elapsed error if tasks are still running at the deadline.
    pub async fn wait_idle_with_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<(), tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, self.wait_idle()).await
    }

    fn increment(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            self.notifier.send_replace(());
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// RAII guard that decrements the in-flight counter on drop
struct DecrementGuard(BackgroundTasks);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn test_wait_idle_waits_for_spawned_task() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&done);
        tasks.spawn("test", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        tasks
            .wait_idle_with_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_task_is_swallowed() {
        let tasks = BackgroundTasks::new();

        tasks.spawn("failing", async { Err(SessionError::Store("boom".into())) });

        tasks
            .wait_idle_with_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_idle() {
        let tasks = BackgroundTasks::new();
        tasks
            .wait_idle_with_timeout(Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[test]
    fn test_spawn_outside_runtime_is_skipped() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("orphan", async { Ok(()) });
        assert_eq!(tasks.in_flight(), 0);
    }
}
