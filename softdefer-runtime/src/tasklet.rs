use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, trace};

use crate::context;
use crate::quiesce::Quiescence;
use crate::runnable::{run_guarded, Runnable};
use crate::status::{QueueStatus, TaskState};

const SCHEDULED: u8 = 0b001;
const RUNNING: u8 = 0b010;
const KILLING: u8 = 0b100;

/// A reusable unit of deferred work run in restricted context
///
/// The task moves `Idle -> Scheduled -> Running -> Idle`. Scheduling an
/// already scheduled task is coalesced. Scheduling while the body is running
/// is never lost: the task runs exactly once more after the current run
/// finishes. Two runs of the same task never overlap, even when scheduled
/// from different execution units.
///
/// [`kill`](Self::kill) cancels a pending run and waits out a running one.
///
/// # Example
///
/// ```rust
/// use softdefer_runtime::{CooperativeTask, TaskState};
///
/// let task = CooperativeTask::new("tick", || {});
/// task.schedule();
/// task.kill();
/// assert_eq!(task.state(), TaskState::Idle);
/// ```
#[derive(Clone)]
pub struct CooperativeTask {
    inner: Arc<Inner>,
}

struct Inner {
    name: &'static str,
    state: AtomicU8,
    body: Box<dyn Runnable>,
    settled: Quiescence,
}

impl CooperativeTask {
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
                state: AtomicU8::new(0),
                body: Box::new(body),
                settled: Quiescence::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Marks the task runnable on the caller's execution unit. Never blocks.
    ///
    /// Requests issued while a [`kill`](Self::kill) is in progress are
    /// absorbed by it and report [`QueueStatus::AlreadyPending`].
    pub fn schedule(&self) -> QueueStatus {
        let state = &self.inner.state;
        let mut current = state.load(Ordering::Acquire);
        loop {
            if current & (SCHEDULED | KILLING) != 0 {
                trace!(task = self.inner.name, "task already scheduled");
                return QueueStatus::AlreadyPending;
            }
            match state.compare_exchange_weak(
                current,
                current | SCHEDULED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Inner::raise(&self.inner, context::current_unit());
        QueueStatus::Queued
    }

    pub fn state(&self) -> TaskState {
        let state = self.inner.state.load(Ordering::Acquire);
        if state & RUNNING != 0 {
            TaskState::Running
        } else if state & SCHEDULED != 0 {
            TaskState::Scheduled
        } else {
            TaskState::Idle
        }
    }

    /// Cancels a pending run and blocks until a running one has finished.
    ///
    /// On return the task is `Idle` and will not run again unless scheduled
    /// afterwards. Idempotent, and safe on a task that was never scheduled.
    ///
    /// # Panics
    ///
    /// Panics when called from a restricted context.
    pub fn kill(&self) {
        context::assert_may_block("CooperativeTask::kill");
        let state = &self.inner.state;

        let previous = state.fetch_or(KILLING, Ordering::AcqRel);
        let previous = previous | state.fetch_and(!SCHEDULED, Ordering::AcqRel);
        if previous & SCHEDULED != 0 {
            debug!(task = self.inner.name, "cancelled pending task run");
        }

        self.inner
            .settled
            .wait_until(|| state.load(Ordering::Acquire) & RUNNING == 0);

        state.fetch_and(!(KILLING | SCHEDULED), Ordering::AcqRel);
        self.inner.settled.notify();
        debug!(task = self.inner.name, "task killed");
    }
}

impl Inner {
    fn raise(this: &Arc<Self>, unit: usize) {
        let task = Arc::clone(this);
        if !context::raise(unit, Box::new(move || Inner::run(&task, unit))) {
            this.state.fetch_and(!SCHEDULED, Ordering::AcqRel);
            this.settled.notify();
        }
    }

    /// One queued entry. Entries are tokens: the `SCHEDULED` bit is the source
    /// of truth, and an entry finding it clear was cancelled or already
    /// consumed by an earlier entry.
    fn run(this: &Arc<Self>, unit: usize) {
        let state = &this.state;
        let mut current = state.load(Ordering::Acquire);
        loop {
            if current & SCHEDULED == 0 || current & KILLING != 0 {
                return;
            }
            if current & RUNNING != 0 {
                // Running on another unit. Retry behind it without blocking this one.
                thread::yield_now();
                Inner::raise(this, unit);
                return;
            }
            match state.compare_exchange_weak(
                current,
                (current & !SCHEDULED) | RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        trace!(task = this.name, unit, "running cooperative task");
        run_guarded(this.name, this.body.as_ref());
        state.fetch_and(!RUNNING, Ordering::AcqRel);
        this.settled.notify();
    }
}

impl fmt::Debug for CooperativeTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CooperativeTask")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{occupy_current_unit, wait_for};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc;
    use std::time::Duration;

    fn counting(name: &'static str) -> (CooperativeTask, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = {
            let runs = Arc::clone(&runs);
            CooperativeTask::new(name, move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };
        (task, runs)
    }

    /// A task whose body reports entry and then waits for permission to leave.
    type Gated = (CooperativeTask, mpsc::Receiver<()>, mpsc::Sender<()>, Arc<AtomicUsize>);

    fn gated(name: &'static str) -> Gated {
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (leave_tx, leave_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let leave_rx = Mutex::new(leave_rx);
        let runs = Arc::new(AtomicUsize::new(0));
        let task = {
            let runs = Arc::clone(&runs);
            CooperativeTask::new(name, move || {
                runs.fetch_add(1, Ordering::SeqCst);
                entered_tx.lock().send(()).ok();
                leave_rx.lock().recv_timeout(Duration::from_secs(5)).ok();
            })
        };
        (task, entered_rx, leave_tx, runs)
    }

    #[test]
    fn test_schedule_then_kill_leaves_idle() {
        let (task, runs) = counting("basic");
        assert_eq!(task.schedule(), QueueStatus::Queued);
        assert!(wait_for(Duration::from_secs(5), || runs.load(Ordering::SeqCst) == 1));
        task.kill();
        assert_eq!(task.state(), TaskState::Idle);
    }

    #[test]
    fn test_scheduled_task_is_coalesced() {
        let (task, runs) = counting("coalesce");
        let release = occupy_current_unit();
        assert_eq!(task.schedule(), QueueStatus::Queued);
        assert_eq!(task.schedule(), QueueStatus::AlreadyPending);
        assert_eq!(task.state(), TaskState::Scheduled);
        drop(release);
        assert!(wait_for(Duration::from_secs(5), || runs.load(Ordering::SeqCst) == 1));
        task.kill();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_kill_cancels_pending_run() {
        let (task, runs) = counting("cancel");
        let release = occupy_current_unit();
        task.schedule();
        task.kill();
        assert_eq!(task.state(), TaskState::Idle);
        drop(release);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_schedule_while_running_runs_again() {
        let (task, entered, leave, runs) = gated("rerun");
        task.schedule();
        entered.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(task.state(), TaskState::Running);

        assert_eq!(task.schedule(), QueueStatus::Queued);
        assert_eq!(task.schedule(), QueueStatus::AlreadyPending);
        leave.send(()).unwrap();

        entered.recv_timeout(Duration::from_secs(5)).unwrap();
        leave.send(()).unwrap();
        assert!(wait_for(Duration::from_secs(5), || task.state() == TaskState::Idle));
        task.kill();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_kill_waits_for_running_body() {
        let finished = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let task = {
            let finished = Arc::clone(&finished);
            CooperativeTask::new("slow", move || {
                entered_tx.lock().send(()).ok();
                std::thread::sleep(Duration::from_millis(100));
                finished.store(true, Ordering::SeqCst);
            })
        };

        task.schedule();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        task.kill();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(task.state(), TaskState::Idle);
    }

    #[test]
    fn test_kill_is_idempotent() {
        let (task, runs) = counting("twice");
        task.kill();
        task.kill();
        task.schedule();
        task.kill();
        task.kill();
        assert_eq!(task.state(), TaskState::Idle);
        assert!(runs.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn test_schedule_after_kill_is_accepted() {
        let (task, runs) = counting("revive");
        task.kill();
        assert_eq!(task.schedule(), QueueStatus::Queued);
        assert!(wait_for(Duration::from_secs(5), || runs.load(Ordering::SeqCst) == 1));
        task.kill();
    }

    #[test]
    fn test_runs_never_overlap_across_units() {
        let active = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(AtomicUsize::new(0));
        let task = {
            let active = Arc::clone(&active);
            let overlapped = Arc::clone(&overlapped);
            let runs = Arc::clone(&runs);
            CooperativeTask::new("exclusive", move || {
                if active.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlapped.store(true, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(2));
                runs.fetch_add(1, Ordering::SeqCst);
                active.fetch_sub(1, Ordering::SeqCst);
            })
        };

        let schedulers: Vec<_> = (0..4)
            .map(|_| {
                let task = task.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        task.schedule();
                        std::thread::sleep(Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for scheduler in schedulers {
            scheduler.join().unwrap();
        }

        assert!(wait_for(Duration::from_secs(5), || task.state() == TaskState::Idle));
        task.kill();
        assert!(!overlapped.load(Ordering::SeqCst));
        let total = runs.load(Ordering::SeqCst);
        assert!(total >= 1 && total <= 80);
    }
}
