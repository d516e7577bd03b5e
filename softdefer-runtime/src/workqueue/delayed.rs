use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

use super::item::{WorkItem, ARMED};
use super::queue::QueueShared;
use crate::context;
use crate::runnable::Runnable;

/// A [`WorkItem`] that reaches its pool only after a timer expires
///
/// Submitted with [`WorkQueue::submit_delayed`](crate::WorkQueue::submit_delayed).
/// Until the timer fires the item is not counted by `flush`; it can be
/// withdrawn with [`cancel_sync`](Self::cancel_sync).
#[derive(Clone)]
pub struct DelayedWorkItem {
    pub(crate) work: WorkItem,
    pub(crate) timer: Arc<Mutex<Option<ArmedTimer>>>,
}

pub(crate) struct ArmedTimer {
    pub(crate) queue: Arc<QueueShared>,
    pub(crate) expiry: AbortHandle,
}

impl DelayedWorkItem {
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
            work: WorkItem::from_runnable(name, body),
            timer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.work.name()
    }

    /// The underlying item, for immediate submission.
    pub fn work(&self) -> &WorkItem {
        &self.work
    }

    /// True while the timer is armed, and from expiry until the body returns.
    pub fn is_pending(&self) -> bool {
        self.work.is_pending()
    }

    /// Disarms the timer if it has not fired, withdraws the item if it fired
    /// but has not started, then blocks until any running execution has
    /// finished.
    ///
    /// Returns whether a pending execution was prevented. `false` means there
    /// was nothing to cancel: the item already ran, or is running and has now
    /// completed.
    ///
    /// # Panics
    ///
    /// Panics when called from a restricted context.
    pub fn cancel_sync(&self) -> bool {
        context::assert_may_block("DelayedWorkItem::cancel_sync");
        let prevented = {
            let mut timer = self.timer.lock();
            match self.work.core.withdraw() {
                Some(ARMED) => {
                    if let Some(armed) = timer.take() {
                        armed.expiry.abort();
                        armed.queue.timer_disarmed();
                    }
                    true
                }
                Some(_) => true,
                None => false,
            }
        };

        self.work.core.wait_not_running();
        if prevented {
            debug!(item = self.work.core.name, "cancelled delayed work item");
        } else {
            debug!(item = self.work.core.name, "nothing to cancel");
        }
        prevented
    }
}

impl fmt::Debug for DelayedWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedWorkItem")
            .field("name", &self.work.core.name)
            .field("pending", &self.is_pending())
            .finish()
    }
}
