use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info, trace, warn};

use super::delayed::{ArmedTimer, DelayedWorkItem};
use super::item::{ItemCore, WorkItem, ARMED, QUEUED};
use super::policy::ConcurrencyPolicy;
use crate::context;
use crate::error::{DestroyError, WorkQueueError};
use crate::status::QueueStatus;

/// A pool of worker threads running [`WorkItem`]s
///
/// Workers may block and sleep freely, and items run in parallel with each
/// other and with the submitter. A dedicated pool is created with
/// [`create`](Self::create), owned by its creator, and torn down with
/// [`destroy`](Self::destroy) once flushed. The shared pool returned by
/// [`system_wq`](crate::system_wq) is only ever borrowed.
///
/// # Example
///
/// ```rust
/// use softdefer_runtime::{ConcurrencyPolicy, WorkItem, WorkQueue};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = WorkQueue::create("example", ConcurrencyPolicy::default().unbound())?;
/// let item = WorkItem::new("hello", || println!("hello from a worker"));
///
/// queue.submit(&item);
/// queue.flush();
/// queue.destroy()?;
/// # Ok(())
/// # }
/// ```
pub struct WorkQueue {
    shared: Arc<QueueShared>,
    runtime: Option<Runtime>,
}

pub(crate) struct QueueShared {
    name: String,
    is_shared: bool,
    policy: ConcurrencyPolicy,
    handle: Handle,
    tickets: Mutex<Tickets>,
    retired: Condvar,
    armed: AtomicUsize,
}

/// Every dispatched execution holds a ticket until it completes. Tickets are
/// handed out in order, so a flush only has to wait for those below the
/// horizon it observed.
#[derive(Default)]
struct Tickets {
    next: u64,
    in_flight: BTreeSet<u64>,
}

impl WorkQueue {
    /// Allocates a dedicated pool.
    ///
    /// Fails with [`WorkQueueError::ResourceExhaustion`] when the worker
    /// threads cannot be obtained. The caller should disable the feature that
    /// needed the pool rather than abort.
    pub fn create(
        name: impl Into<String>,
        policy: ConcurrencyPolicy,
    ) -> Result<Self, WorkQueueError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WorkQueueError::InvalidName);
        }
        let queue = Self::build(name, policy, false)?;
        info!(
            queue = %queue.shared.name,
            workers = policy.worker_limit(),
            unbound = policy.unbound,
            high_priority = policy.high_priority,
            "workqueue created"
        );
        Ok(queue)
    }

    pub(crate) fn build(
        name: String,
        policy: ConcurrencyPolicy,
        is_shared: bool,
    ) -> Result<Self, WorkQueueError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(policy.worker_limit())
            .thread_name(policy.thread_name(&name))
            .enable_time()
            .build()
            .map_err(|source| WorkQueueError::ResourceExhaustion {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            shared: Arc::new(QueueShared {
                name,
                is_shared,
                policy,
                handle: runtime.handle().clone(),
                tickets: Mutex::new(Tickets::default()),
                retired: Condvar::new(),
                armed: AtomicUsize::new(0),
            }),
            runtime: Some(runtime),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// True for the process-wide pool.
    pub fn is_shared(&self) -> bool {
        self.shared.is_shared
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.shared.policy
    }

    /// Items dispatched to a worker and not yet completed.
    pub fn outstanding(&self) -> usize {
        self.shared.tickets.lock().in_flight.len()
    }

    /// Delayed items whose timer has not fired yet.
    pub fn armed_timers(&self) -> usize {
        self.shared.armed.load(Ordering::Acquire)
    }

    /// Queues `item` for the next free worker. Never blocks.
    pub fn submit(&self, item: &WorkItem) -> QueueStatus {
        match item.core.claim(QUEUED) {
            Some(claim) => {
                self.shared.dispatch(Arc::clone(&item.core), claim);
                QueueStatus::Queued
            }
            None => {
                trace!(
                    queue = %self.shared.name,
                    item = item.core.name,
                    "work item already pending"
                );
                QueueStatus::AlreadyPending
            }
        }
    }

    /// Arms a timer that hands `item` to this pool after `delay`. Never
    /// blocks. A zero delay submits immediately.
    pub fn submit_delayed(&self, item: &DelayedWorkItem, delay: Duration) -> QueueStatus {
        if delay.is_zero() {
            return self.submit(&item.work);
        }

        let mut timer = item.timer.lock();
        let Some(claim) = item.work.core.claim(ARMED) else {
            trace!(
                queue = %self.shared.name,
                item = item.work.core.name,
                "delayed item already pending"
            );
            return QueueStatus::AlreadyPending;
        };
        self.shared.armed.fetch_add(1, Ordering::AcqRel);

        let queue = Arc::clone(&self.shared);
        let core = Arc::clone(&item.work.core);
        let expiry = self.shared.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if core.fire(claim) {
                trace!(queue = %queue.name, item = core.name, "delayed item timer fired");
                let ticket = queue.enlist();
                queue.timer_disarmed();
                queue.launch(core, claim, ticket);
            }
        });

        *timer = Some(ArmedTimer {
            queue: Arc::clone(&self.shared),
            expiry: expiry.abort_handle(),
        });
        debug!(
            queue = %self.shared.name,
            item = item.work.core.name,
            delay_ms = delay.as_millis() as u64,
            "delayed item armed"
        );
        QueueStatus::Queued
    }

    /// Cancels a delayed item before its timer fires.
    ///
    /// Same as [`DelayedWorkItem::cancel_sync`].
    pub fn cancel_delayed(&self, item: &DelayedWorkItem) -> bool {
        item.cancel_sync()
    }

    /// Blocks until every item queued or running at the time of the call has
    /// completed. Items submitted while flushing are not waited for, and
    /// delayed items count only once their timer has fired.
    ///
    /// # Panics
    ///
    /// Panics when called from a restricted context.
    pub fn flush(&self) {
        context::assert_may_block("WorkQueue::flush");
        let mut tickets = self.shared.tickets.lock();
        let horizon = tickets.next;
        debug!(
            queue = %self.shared.name,
            outstanding = tickets.in_flight.len(),
            "flushing workqueue"
        );
        while tickets
            .in_flight
            .first()
            .is_some_and(|&oldest| oldest < horizon)
        {
            self.shared.retired.wait(&mut tickets);
        }
    }

    /// Releases a dedicated pool's worker threads.
    ///
    /// The pool must be quiescent: flushed, with no delayed item still armed.
    /// Otherwise the queue is handed back inside the error, untouched.
    ///
    /// The shared pool can never reach this call; it is only reachable by
    /// shared reference:
    ///
    /// ```compile_fail
    /// softdefer_runtime::system_wq().destroy();
    /// ```
    pub fn destroy(mut self) -> Result<(), DestroyError> {
        let outstanding = self.outstanding();
        let armed_timers = self.armed_timers();
        if outstanding > 0 || armed_timers > 0 {
            warn!(
                queue = %self.shared.name,
                outstanding,
                armed_timers,
                "refusing to destroy a busy workqueue"
            );
            return Err(DestroyError {
                name: self.shared.name.clone(),
                outstanding,
                armed_timers,
                queue: self,
            });
        }

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        info!(queue = %self.shared.name, "workqueue destroyed");
        Ok(())
    }
}

impl QueueShared {
    fn dispatch(self: &Arc<Self>, core: Arc<ItemCore>, claim: u64) {
        let ticket = self.enlist();
        self.launch(core, claim, ticket);
    }

    fn enlist(&self) -> u64 {
        let mut tickets = self.tickets.lock();
        let ticket = tickets.next;
        tickets.next += 1;
        tickets.in_flight.insert(ticket);
        ticket
    }

    fn launch(self: &Arc<Self>, core: Arc<ItemCore>, claim: u64, ticket: u64) {
        let queue = Arc::clone(self);
        self.handle.spawn_blocking(move || {
            if core.begin(claim) {
                core.execute(claim, &queue.name);
            }
            queue.retire(ticket);
        });
    }

    fn retire(&self, ticket: u64) {
        let mut tickets = self.tickets.lock();
        tickets.in_flight.remove(&ticket);
        self.retired.notify_all();
    }

    pub(crate) fn timer_disarmed(&self) {
        self.armed.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            warn!(queue = %self.shared.name, "workqueue dropped without destroy");
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.shared.name)
            .field("shared", &self.shared.is_shared)
            .field("policy", &self.shared.policy)
            .field("outstanding", &self.outstanding())
            .field("armed_timers", &self.armed_timers())
            .finish()
    }
}
