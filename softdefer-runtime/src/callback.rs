use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::context;
use crate::quiesce::Quiescence;
use crate::runnable::{run_guarded, Runnable};
use crate::status::QueueStatus;

const IDLE: u8 = 0;
const PENDING: u8 = 1;
const RUNNING: u8 = 2;

/// A callback deferred onto the caller's own execution unit
///
/// `schedule` queues the body to run on the restricted context of the unit
/// the caller lives on, strictly after `schedule` returns. At most one
/// execution is pending or in flight at a time: scheduling again before the
/// previous run has finished is coalesced and reports
/// [`QueueStatus::AlreadyPending`].
///
/// The body runs in restricted context and must not block.
///
/// Cloning yields another handle to the same callback.
///
/// # Example
///
/// ```rust
/// use softdefer_runtime::DeferredCallback;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let callback = {
///     let hits = Arc::clone(&hits);
///     DeferredCallback::new("count", move || {
///         hits.fetch_add(1, Ordering::Relaxed);
///     })
/// };
///
/// callback.schedule();
/// callback.drain();
/// assert!(hits.load(Ordering::Relaxed) <= 1);
/// ```
#[derive(Clone)]
pub struct DeferredCallback {
    inner: Arc<Inner>,
}

struct Inner {
    name: &'static str,
    state: AtomicU8,
    body: Box<dyn Runnable>,
    settled: Quiescence,
}

impl DeferredCallback {
    pub fn new<F>(name: &'static str, body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::from_runnable(name, body)
    }

    pub fn from_runnable<R>(name: &'static str, body: R) -> Self
    where
        R: Runnable + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name,
                state: AtomicU8::new(IDLE),
                body: Box::new(body),
                settled: Quiescence::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Requests a run on the caller's execution unit. Never blocks.
    pub fn schedule(&self) -> QueueStatus {
        if self
            .inner
            .state
            .compare_exchange(IDLE, PENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!(callback = self.inner.name, "callback already pending");
            return QueueStatus::AlreadyPending;
        }

        let unit = context::current_unit();
        let inner = Arc::clone(&self.inner);
        if !context::raise(unit, Box::new(move || inner.run(unit))) {
            self.inner.settle();
        }
        QueueStatus::Queued
    }

    /// True while a run is pending or in flight.
    pub fn is_pending(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != IDLE
    }

    /// Blocks until any pending or in-flight run has completed.
    ///
    /// # Panics
    ///
    /// Panics when called from a restricted context.
    pub fn drain(&self) {
        context::assert_may_block("DeferredCallback::drain");
        let state = &self.inner.state;
        self.inner
            .settled
            .wait_until(|| state.load(Ordering::Acquire) == IDLE);
        debug!(callback = self.inner.name, "callback drained");
    }
}

impl Inner {
    fn run(&self, unit: usize) {
        self.state.store(RUNNING, Ordering::Release);
        trace!(callback = self.name, unit, "running deferred callback");
        run_guarded(self.name, self.body.as_ref());
        self.settle();
    }

    fn settle(&self) {
        self.state.store(IDLE, Ordering::Release);
        self.settled.notify();
    }
}

impl fmt::Debug for DeferredCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCallback")
            .field("name", &self.inner.name)
            .field("pending", &self.is_pending())
            .finish()
    }
}
