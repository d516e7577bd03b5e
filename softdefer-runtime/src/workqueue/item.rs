use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::context;
use crate::quiesce::Quiescence;
use crate::runnable::{run_guarded, Runnable};

// Item state word: a claim generation in the high bits, a status in the low two.
// Every successful claim bumps the generation, so a stale worker or timer
// holding an older generation can never start a newer submission.
pub(crate) const IDLE: u64 = 0;
pub(crate) const ARMED: u64 = 1;
pub(crate) const QUEUED: u64 = 2;
pub(crate) const RUNNING: u64 = 3;

const STATUS_BITS: u32 = 2;
const STATUS_MASK: u64 = (1 << STATUS_BITS) - 1;

fn pack(generation: u64, status: u64) -> u64 {
    (generation << STATUS_BITS) | status
}

fn status(word: u64) -> u64 {
    word & STATUS_MASK
}

fn generation(word: u64) -> u64 {
    word >> STATUS_BITS
}

pub(crate) struct ItemCore {
    pub(crate) name: &'static str,
    state: AtomicU64,
    body: Box<dyn Runnable>,
    settled: Quiescence,
}

impl ItemCore {
    fn new(name: &'static str, body: Box<dyn Runnable>) -> Self {
        Self {
            name,
            state: AtomicU64::new(pack(0, IDLE)),
            body,
            settled: Quiescence::new(),
        }
    }

    pub(crate) fn status(&self) -> u64 {
        status(self.state.load(Ordering::Acquire))
    }

    /// `IDLE -> to`, returning the new claim generation.
    pub(crate) fn claim(&self, to: u64) -> Option<u64> {
        let current = self.state.load(Ordering::Acquire);
        if status(current) != IDLE {
            return None;
        }
        let next = generation(current).wrapping_add(1);
        self.state
            .compare_exchange(current, pack(next, to), Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| next)
    }

    fn transition(&self, claim: u64, from: u64, to: u64) -> bool {
        self.state
            .compare_exchange(
                pack(claim, from),
                pack(claim, to),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Timer expiry: `ARMED -> QUEUED` for the given claim.
    pub(crate) fn fire(&self, claim: u64) -> bool {
        self.transition(claim, ARMED, QUEUED)
    }

    /// Worker pickup: `QUEUED -> RUNNING` for the given claim.
    pub(crate) fn begin(&self, claim: u64) -> bool {
        self.transition(claim, QUEUED, RUNNING)
    }

    /// Withdraws an armed or queued claim that has not started. Returns the
    /// status it was withdrawn from.
    ///
    /// Withdrawing from `ARMED` leaves the timer and the pool's armed count
    /// to the caller, so only the delayed item's cancel may do it.
    pub(crate) fn withdraw(&self) -> Option<u64> {
        self.withdraw_if(|from| from == ARMED || from == QUEUED)
    }

    /// Withdraws a claim that has reached its pool but not started.
    pub(crate) fn withdraw_queued(&self) -> bool {
        self.withdraw_if(|from| from == QUEUED).is_some()
    }

    fn withdraw_if(&self, accept: impl Fn(u64) -> bool) -> Option<u64> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = status(current);
            if !accept(from) {
                return None;
            }
            match self.state.compare_exchange_weak(
                current,
                pack(generation(current), IDLE),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.settled.notify();
                    return Some(from);
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Runs the body for a claim that [`begin`](Self::begin) accepted.
    pub(crate) fn execute(&self, claim: u64, queue: &str) {
        debug!(
            queue,
            item = self.name,
            worker = std::thread::current().name().unwrap_or("unnamed"),
            "running work item"
        );
        run_guarded(self.name, self.body.as_ref());
        self.state.store(pack(claim, IDLE), Ordering::Release);
        self.settled.notify();
    }

    pub(crate) fn wait_not_running(&self) {
        self.settled
            .wait_until(|| status(self.state.load(Ordering::Acquire)) != RUNNING);
    }
}

/// A unit of work for a [`WorkQueue`](crate::WorkQueue)
///
/// An item is outstanding from the moment it is submitted until its body
/// returns. While outstanding, submitting it again, to the same pool or any
/// other, is rejected with
/// [`QueueStatus::AlreadyPending`](crate::QueueStatus::AlreadyPending).
///
/// Cloning yields another handle to the same item.
#[derive(Clone)]
pub struct WorkItem {
    pub(crate) core: Arc<ItemCore>,
}

impl WorkItem {
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
            core: Arc::new(ItemCore::new(name, Box::new(body))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.core.name
    }

    /// True from submission until the body returns.
    pub fn is_pending(&self) -> bool {
        self.core.status() != IDLE
    }

    /// Cancels the item if it is queued but not started, then blocks until
    /// any running execution has finished.
    ///
    /// Returns whether a queued execution was prevented. An item whose delay
    /// timer is still armed is left alone; cancel it through
    /// [`DelayedWorkItem::cancel_sync`](crate::DelayedWorkItem::cancel_sync).
    ///
    /// # Panics
    ///
    /// Panics when called from a restricted context.
    pub fn cancel_sync(&self) -> bool {
        context::assert_may_block("WorkItem::cancel_sync");
        let cancelled = self.core.withdraw_queued();
        self.core.wait_not_running();
        if cancelled {
            debug!(item = self.core.name, "cancelled queued work item");
        }
        cancelled
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("name", &self.core.name)
            .field("pending", &self.is_pending())
            .finish()
    }
}
