//! The process-wide shared pool.

use std::sync::OnceLock;
use std::time::Duration;

use super::delayed::DelayedWorkItem;
use super::item::WorkItem;
use super::policy::ConcurrencyPolicy;
use super::queue::WorkQueue;
use crate::status::QueueStatus;

pub const SYSTEM_WQ_NAME: &str = "events";

static SYSTEM_WQ: OnceLock<WorkQueue> = OnceLock::new();

/// The shared pool, started on first use and never destroyed.
///
/// Components borrow it: they may submit to it and flush it, but only a
/// shared reference is ever handed out, so it cannot be destroyed.
///
/// # Panics
///
/// Panics if the pool's threads cannot be started. The shared pool belongs
/// to the host environment, so this is fatal for the process.
pub fn system_wq() -> &'static WorkQueue {
    SYSTEM_WQ.get_or_init(|| {
        WorkQueue::build(SYSTEM_WQ_NAME.to_string(), ConcurrencyPolicy::default(), true)
            .unwrap_or_else(|e| panic!("failed to start the system workqueue: {e}"))
    })
}

/// Submits `item` to the shared pool.
pub fn schedule_work(item: &WorkItem) -> QueueStatus {
    system_wq().submit(item)
}

/// Submits `item` to the shared pool after `delay`.
pub fn schedule_delayed_work(item: &DelayedWorkItem, delay: Duration) -> QueueStatus {
    system_wq().submit_delayed(item, delay)
}

/// Waits for everything outstanding on the shared pool.
pub fn flush_scheduled_work() {
    system_wq().flush();
}
