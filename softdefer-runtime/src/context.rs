//! Restricted execution context.
//!
//! A fixed set of execution units, each a dedicated OS thread draining a FIFO
//! of short jobs. Jobs on one unit are serialized. Every caller thread has a
//! home unit, and deferrals raised from that thread run there.
//!
//! Code running inside a job must not block, sleep, or wait on another
//! restricted job. The blocking half of the API (`drain`, `kill`, `flush`,
//! `cancel_sync`) checks this and panics when called from a job.

use std::cell::Cell;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::thread;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

const FALLBACK_UNITS: usize = 4;

static UNITS: OnceLock<Units> = OnceLock::new();
static NEXT_HOME: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static HOME_UNIT: Cell<Option<usize>> = const { Cell::new(None) };
    static IN_RESTRICTED: Cell<bool> = const { Cell::new(false) };
}

struct Units {
    queues: Vec<UnboundedSender<Job>>,
}

impl Units {
    fn spawn(count: usize) -> Self {
        let queues = (0..count)
            .map(|index| {
                let (sender, receiver) = mpsc::unbounded_channel();
                thread::Builder::new()
                    .name(format!("softirqd/{index}"))
                    .spawn(move || unit_loop(index, receiver))
                    .unwrap_or_else(|e| panic!("failed to start execution unit {index}: {e}"));
                sender
            })
            .collect();
        Self { queues }
    }
}

fn units() -> &'static Units {
    UNITS.get_or_init(|| Units::spawn(default_unit_count()))
}

fn default_unit_count() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(FALLBACK_UNITS)
}

fn unit_loop(index: usize, mut jobs: UnboundedReceiver<Job>) {
    HOME_UNIT.with(|home| home.set(Some(index)));
    debug!(unit = index, "execution unit online");
    while let Some(job) = jobs.blocking_recv() {
        IN_RESTRICTED.with(|flag| flag.set(true));
        job();
        IN_RESTRICTED.with(|flag| flag.set(false));
    }
}

/// Starts the execution units with an explicit unit count.
///
/// Returns `false` if the units were already running, in which case the
/// existing count is kept. Without this call the units start lazily, one per
/// available CPU.
///
/// # Panics
///
/// Panics if `count` is zero or a unit thread cannot be spawned. The units
/// belong to the host environment, so failing to start them is fatal.
pub fn init(count: usize) -> bool {
    assert!(count > 0, "at least one execution unit is required");
    let mut started = false;
    UNITS.get_or_init(|| {
        started = true;
        Units::spawn(count)
    });
    started
}

/// Number of execution units.
pub fn unit_count() -> usize {
    units().queues.len()
}

/// The execution unit the calling thread defers work onto.
///
/// Unit threads report their own index. Any other thread is assigned a home
/// unit round-robin on first use and keeps it for its lifetime.
pub fn current_unit() -> usize {
    HOME_UNIT.with(|home| match home.get() {
        Some(unit) => unit,
        None => {
            let unit = NEXT_HOME.fetch_add(1, Ordering::Relaxed) % unit_count();
            home.set(Some(unit));
            unit
        }
    })
}

/// True while the calling thread is running a restricted job.
pub fn in_restricted_context() -> bool {
    IN_RESTRICTED.with(Cell::get)
}

/// Queues `job` on `unit`. Never blocks.
///
/// Returns `false` if the unit is gone and the job was dropped.
pub(crate) fn raise(unit: usize, job: Job) -> bool {
    let queues = &units().queues;
    match queues[unit % queues.len()].send(job) {
        Ok(()) => true,
        Err(_) => {
            error!(unit, "execution unit is offline; dropping deferred job");
            false
        }
    }
}

pub(crate) fn assert_may_block(operation: &str) {
    assert!(
        !in_restricted_context(),
        "{operation} would block an execution unit; call it from process context"
    );
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[test]
    fn test_home_unit_is_stable() {
        let first = current_unit();
        assert_eq!(first, current_unit());
        assert!(first < unit_count());
    }

    #[test]
    fn test_process_context_is_unrestricted() {
        assert!(!in_restricted_context());
        assert_may_block("test");
    }

    #[test]
    fn test_job_runs_restricted_on_requested_unit() {
        let unit = current_unit();
        let (tx, rx) = std_mpsc::channel();
        assert!(raise(
            unit,
            Box::new(move || {
                tx.send((current_unit(), in_restricted_context())).ok();
            })
        ));
        let (ran_on, restricted) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(ran_on, unit);
        assert!(restricted);
    }

    #[test]
    fn test_jobs_on_one_unit_run_in_order() {
        let unit = current_unit();
        let (tx, rx) = std_mpsc::channel();
        for i in 0..16 {
            let tx = tx.clone();
            assert!(raise(unit, Box::new(move || tx.send(i).unwrap())));
        }
        let seen: Vec<i32> = (0..16)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_blocking_from_a_job_is_rejected() {
        let (tx, rx) = std_mpsc::channel();
        assert!(raise(
            current_unit(),
            Box::new(move || {
                let outcome = std::panic::catch_unwind(|| assert_may_block("flush"));
                tx.send(outcome.is_err()).ok();
            })
        ));
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn test_second_init_keeps_existing_units() {
        let count = unit_count();
        assert!(!init(count + 1));
        assert_eq!(unit_count(), count);
    }
}
