//! Cooperative cancellation
//!
//! A [`CancellationSignal`] is passed alongside the input through every
//! middleware and handler invocation of a call. Cancelling does not unwind
//! the chain; each step is responsible for observing the signal and stopping
//! its own work. The executor's contract is only to propagate the same
//! signal, unchanged, to every step (and to every replay when `next` is
//! invoked more than once).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Shared {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Clonable cancellation signal; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    shared: Arc<Shared>,
}

impl CancellationSignal {
    /// Create a new, uncancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the signal, waking all waiters.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.shared.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// True if `other` shares this signal's state.
    pub fn same_signal(&self, other: &CancellationSignal) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
