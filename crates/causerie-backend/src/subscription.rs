//! Cancellation handles for live queries.
//!
//! Every `subscribe_*` operation returns a [`Subscription`] and keeps a
//! [`CancelFlag`] on the producer side.  Cancellation is monotonic: it is
//! safe to invoke any number of times, and once the flag is set the
//! producer must drop any delivery that raced with the cancel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Delivery channel for live-query snapshots.  Unbounded so producers
/// never block inside a fan-out.
pub type SnapshotSink<T> = mpsc::UnboundedSender<T>;

/// Producer-side view of a subscription's liveness.
#[derive(Debug, Clone)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Owner-side cancellation handle.
///
/// Exactly one owner holds this; dropping it cancels the subscription,
/// so replacing a stored handle tears the old live query down.
pub struct Subscription {
    flag: Arc<AtomicBool>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// A subscription whose producer only polls the [`CancelFlag`].
    pub fn new() -> (Self, CancelFlag) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Self {
                flag: flag.clone(),
                teardown: None,
            },
            CancelFlag(flag),
        )
    }

    /// A subscription that additionally runs `teardown` once on cancel,
    /// for producers that need an active stop signal (e.g. a task to wake).
    pub fn with_teardown(teardown: impl FnOnce() + Send + 'static) -> (Self, CancelFlag) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Self {
                flag: flag.clone(),
                teardown: Some(Box::new(teardown)),
            },
            CancelFlag(flag),
        )
    }

    /// Cancel the live query.  No-op after the first call.
    pub fn cancel(&mut self) {
        self.flag.store(true, Ordering::Release);
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
