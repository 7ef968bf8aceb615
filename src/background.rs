//! Background task tracking.
//!
//! Fire-and-forget work (notifications, cleanup) runs here, off the request
//! path. Failures are logged and go no further. The orchestrator drains the
//! tracker during shutdown.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Result of waiting for background work during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every tracked task finished
    Drained,
    /// The deadline passed with tasks still running; they are abandoned
    TimedOut { outstanding: usize },
}

/// Tracker for detached background tasks.
///
/// Cloning is cheap and every clone shares the same counter.
#[derive(Clone)]
pub struct BackgroundTasks {
    outstanding: Arc<watch::Sender<usize>>,
}

/// Decrements the outstanding counter when dropped, so the count stays
/// correct whether the task returns, errors, panics or is cancelled by the
/// runtime shutting down.
struct CompletionGuard {
    outstanding: Arc<watch::Sender<usize>>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.outstanding.send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(outstanding),
        }
    }

    /// Run `task` detached from the caller.
    ///
    /// The counter is incremented before the task starts. An `Err` or a
    /// panic inside the task is logged under `name` and otherwise ignored.
    pub fn spawn<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.outstanding.send_modify(|count| *count += 1);
        let guard = CompletionGuard {
            outstanding: Arc::clone(&self.outstanding),
        };

        tokio::spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => debug!(task = name, "Background task completed"),
                Ok(Err(e)) => error!(task = name, error = %e, "Background task failed"),
                Err(panic) => error!(
                    task = name,
                    panic = panic_message(panic.as_ref()),
                    "Background task panicked"
                ),
            }
        });
    }

    /// Number of tasks spawned and not yet finished.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Wait until no tasks are outstanding.
    pub async fn drain_and_wait(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Wait until no tasks are outstanding or `deadline` passes.
    pub async fn drain_until(&self, deadline: Instant) -> DrainOutcome {
        match tokio::time::timeout_at(deadline, self.drain_and_wait()).await {
            Ok(()) => DrainOutcome::Drained,
            Err(_) => {
                let outstanding = self.outstanding();
                warn!(outstanding = outstanding, "Abandoning unfinished background tasks");
                DrainOutcome::TimedOut { outstanding }
            }
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
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
