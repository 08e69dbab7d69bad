//! Cancellation/shutdown primitives shared by the bus's `waitForMessage`
//! and the scheduler's main loop (spec.md §4.1, §4.2).
//!
//! Kept here rather than in `orgruntime::scheduler` so the bus does not
//! have to depend "upward" on the scheduler to implement its own wait
//! primitive — both sit on this kernel-level type instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Which of the two shutdown paths in spec.md §4.2 is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Stop accepting new LLM calls, drain in-flight handlers, flush
    /// delayed messages due by the stop instant, then persist.
    Graceful,
    /// Abort in-flight LLM requests immediately, discard pending delayed
    /// messages with a warning, persist whatever is consistent.
    Forced,
}

/// A broadcastable "please stop" signal. Cheap to clone — all clones
/// observe the same underlying state.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    notify: Arc<Notify>,
    requested: Arc<AtomicBool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self { notify: Arc::new(Notify::new()), requested: Arc::new(AtomicBool::new(false)) }
    }

    /// Mark the signal as requested and wake every current waiter.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once [`ShutdownSignal::request`] has been called. Safe to
    /// call even if the request happened before this call: it returns
    /// immediately rather than missing the wakeup.
    pub async fn cancelled(&self) {
        if self.is_requested() {
            return;
        }
        let notified = self.notify.notified();
        if self.is_requested() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_requested() {
        let signal = ShutdownSignal::new();
        signal.request();
        tokio::time::timeout(std::time::Duration::from_millis(50), signal.cancelled())
            .await
            .expect("cancelled() should resolve immediately");
    }

    #[tokio::test]
    async fn cancelled_resolves_after_request_from_another_task() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            clone.request();
        });
        signal.cancelled().await;
        handle.await.unwrap();
        assert!(signal.is_requested());
    }
}
