use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

/// Body of a deferred unit of work
///
/// Every `Fn() + Send + Sync` closure is a `Runnable`, so most callers never
/// name this trait. Implement it on your own type when the body carries state
/// of its own.
///
/// # Example
///
/// ```rust
/// use softdefer_runtime::{Runnable, WorkItem};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct Heartbeat {
///     beats: AtomicUsize,
/// }
///
/// impl Runnable for Heartbeat {
///     fn run(&self) {
///         self.beats.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let item = WorkItem::from_runnable("heartbeat", Heartbeat { beats: AtomicUsize::new(0) });
/// assert!(!item.is_pending());
/// ```
pub trait Runnable: Send + Sync {
    /// Execute the deferred body
    fn run(&self);
}

impl<F> Runnable for F
where
    F: Fn() + Send + Sync,
{
    fn run(&self) {
        self()
    }
}

/// Runs `body`, containing any panic so the owner can still settle its state.
///
/// Returns `false` when the body panicked.
pub(crate) fn run_guarded(name: &str, body: &dyn Runnable) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| body.run())) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                unit_of_work = name,
                panic = %panic_message(payload.as_ref()),
                "deferred body panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
