//! # Settlement
//!
//! Single-assignment outcome cell shared by the callbacks that race to
//! finish an operation.
//!
//! Flow:
//! 1. The operation creates a `Settlement` and keeps its `Outcome` receiver
//! 2. Racing callbacks each hold a clone of the `Settlement`
//! 3. The first `settle()` delivers its value; later calls return `false`
//! 4. The operation awaits the `Outcome`

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

/// Writer side of a single-assignment cell. Cheap to clone.
pub struct Settlement<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Settlement<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> Settlement<T> {
    /// Create a pending settlement and the receiver for its outcome.
    #[must_use]
    pub fn new() -> (Self, Outcome<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            Outcome { receiver: rx },
        )
    }

    /// Move from pending to terminal with `value`.
    ///
    /// Returns `true` if this call settled the cell, `false` if it was
    /// already terminal (the value is dropped).
    pub fn settle(&self, value: T) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            debug!("Settlement already terminal, ignoring value");
            return false;
        };
        // A dropped receiver still counts as settled: nobody else may write.
        let _ = sender.send(value);
        true
    }

    /// Whether a value has been accepted.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Reader side of a [`Settlement`].
///
/// Resolves to `None` only if every writer was dropped without settling.
pub struct Outcome<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Future for Outcome<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(Result::ok)
    }
}
