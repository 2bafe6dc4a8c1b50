//! # Deadline Timer
//!
//! A cancellable, one-shot scheduled callback.
//!
//! Every ordering of `cancel` and `arm` is safe: cancelling before arming
//! makes the later arm a no-op, cancelling after the callback ran does
//! nothing, and a timer that wakes after cancellation skips its callback.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

struct TimerState {
    cancelled: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Cancellable deadline. Clones control the same timer.
#[derive(Clone)]
pub struct DeadlineTimer {
    state: Arc<TimerState>,
}

impl DeadlineTimer {
    /// Create an unarmed timer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(TimerState {
                cancelled: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    /// Schedule `on_expiry` to run once after `after`.
    ///
    /// Returns `false` if the timer was already cancelled or armed.
    pub fn arm<F>(&self, after: Duration, on_expiry: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut task = self.state.task.lock();
        if task.is_some() || self.is_cancelled() {
            return false;
        }

        let state = self.state.clone();
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Claim the expiry; a concurrent cancel that got here first wins.
            if state.cancelled.swap(true, Ordering::SeqCst) {
                debug!("Deadline fired after cancellation, ignoring");
                return;
            }
            on_expiry();
        }));
        true
    }

    /// Cancel the timer. Idempotent.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.state.task.lock().take() {
            task.abort();
        }
    }

    /// Whether the timer was cancelled or has already fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for DeadlineTimer {
    fn default() -> Self {
        Self::new()
    }
}
