use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::context::current_unit;
use crate::{
    deferral_module, delayed_work_item, deserialize_delay, flush_scheduled_work,
    schedule_delayed_work, schedule_work, work_item, ConcurrencyPolicy, DeferralModule,
    ModuleError, QueueStatus, WorkQueue,
};

/// Name of the dedicated pool created at load.
pub const DEDICATED_WQ_NAME: &str = "ex_wq_demo";

static SYSTEM_RUNS: AtomicUsize = AtomicUsize::new(0);
static DELAYED_RUNS: AtomicUsize = AtomicUsize::new(0);
static DEDICATED_RUNS: AtomicUsize = AtomicUsize::new(0);
static DELAY_MS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkqueueParams {
    /// Work items queued on the shared pool at load
    pub burst: u32,
    #[serde(deserialize_with = "deserialize_delay")]
    pub spacing: Duration,
    /// Delay for the delayed item
    #[serde(deserialize_with = "deserialize_delay")]
    pub delay: Duration,
    /// Also create the dedicated pool and queue one item on it
    pub dedicated: bool,
    /// Concurrency of the dedicated pool, read from `[ex_workqueue.policy]`
    pub policy: ConcurrencyPolicy,
}

impl Default for WorkqueueParams {
    fn default() -> Self {
        Self {
            burst: 3,
            spacing: Duration::from_millis(30),
            delay: Duration::from_millis(200),
            dedicated: true,
            policy: ConcurrencyPolicy::default().unbound().high_priority(),
        }
    }
}

#[work_item]
pub fn sys_wq_work() {
    SYSTEM_RUNS.fetch_add(1, Ordering::SeqCst);
    info!(unit = current_unit(), "ex_workqueue: system wq work");
}

#[delayed_work_item]
pub fn sys_wq_delayed() {
    DELAYED_RUNS.fetch_add(1, Ordering::SeqCst);
    info!(
        unit = current_unit(),
        delay_ms = DELAY_MS.load(Ordering::Relaxed),
        "ex_workqueue: system DELAYED work"
    );
}

#[work_item]
pub fn dedicated_work() {
    DEDICATED_RUNS.fetch_add(1, Ordering::SeqCst);
    info!(unit = current_unit(), "ex_workqueue: dedicated wq work");
}

/// Executions of each demo item since the process started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executions {
    pub system: usize,
    pub delayed: usize,
    pub dedicated: usize,
}

pub fn executions() -> Executions {
    Executions {
        system: SYSTEM_RUNS.load(Ordering::SeqCst),
        delayed: DELAYED_RUNS.load(Ordering::SeqCst),
        dedicated: DEDICATED_RUNS.load(Ordering::SeqCst),
    }
}

/// Shared pool burst, one delayed item, one item on a dedicated pool
///
/// Unload cancels the delayed item, flushes the shared pool, then flushes
/// and destroys the dedicated pool.
#[derive(Debug)]
pub struct ExWorkqueue {
    dedicated: Option<WorkQueue>,
}

#[deferral_module(name = "ex_workqueue")]
impl DeferralModule for ExWorkqueue {
    type Params = WorkqueueParams;

    fn init(params: WorkqueueParams) -> Result<Self, ModuleError> {
        DELAY_MS.store(params.delay.as_millis() as u64, Ordering::Relaxed);

        let dedicated = if params.dedicated {
            Some(WorkQueue::create(DEDICATED_WQ_NAME, params.policy)?)
        } else {
            None
        };

        info!(
            burst = params.burst,
            delay_ms = params.delay.as_millis() as u64,
            dedicated = params.dedicated,
            "ex_workqueue: init, queuing system work, one delayed item and dedicated work"
        );

        for i in 1..=params.burst {
            let status = schedule_work(&SYS_WQ_WORK);
            info!(n = i, burst = params.burst, ?status, "ex_workqueue: queued system work");
            thread::sleep(params.spacing);
        }

        schedule_delayed_work(&SYS_WQ_DELAYED, params.delay);
        info!(
            delay_ms = params.delay.as_millis() as u64,
            "ex_workqueue: queued delayed work"
        );

        if let Some(queue) = &dedicated {
            match queue.submit(&DEDICATED_WORK) {
                QueueStatus::Queued => info!("ex_workqueue: queued dedicated work"),
                QueueStatus::AlreadyPending => {
                    info!("ex_workqueue: dedicated work was already queued")
                }
            }
        }

        Ok(ExWorkqueue { dedicated })
    }

    fn exit(mut self) {
        if SYS_WQ_DELAYED.cancel_sync() {
            info!("ex_workqueue: delayed work cancelled before it ran");
        }
        flush_scheduled_work();

        if let Some(queue) = self.dedicated.take() {
            teardown(queue);
        }

        info!("ex_workqueue: exit (all work flushed and destroyed)");
    }
}

/// Flushes `queue` and destroys it once. A pool that is still not quiescent
/// is logged and dropped, which stops its workers without waiting.
fn teardown(queue: WorkQueue) -> bool {
    queue.flush();
    match queue.destroy() {
        Ok(()) => true,
        Err(busy) => {
            error!(error = %busy, "ex_workqueue: dedicated pool not quiescent; dropping it");
            drop(busy.into_queue());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{module_params, DelayedWorkItem, WorkItem};
    use config::{Config, File, FileFormat};
    use std::sync::Arc;
    use std::time::Instant;

    fn from_toml(source: &str) -> Config {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_policy_is_unbound_high_priority() {
        let params: WorkqueueParams = module_params(&from_toml(""), "ex_workqueue").unwrap();
        assert!(params.policy.unbound);
        assert!(params.policy.high_priority);
        assert_eq!(params.burst, 3);
    }

    #[test]
    fn test_policy_table_is_read() {
        let config = from_toml(
            "[ex_workqueue]\nburst = 1\n\n[ex_workqueue.policy]\nmax_active = 2\nunbound = true\n",
        );
        let params: WorkqueueParams = module_params(&config, "ex_workqueue").unwrap();
        assert_eq!(params.burst, 1);
        assert_eq!(params.policy.max_active, 2);
        assert!(params.policy.unbound);
        assert!(!params.policy.high_priority);
        assert_eq!(params.policy.worker_limit(), 2);
    }

    #[test]
    fn test_teardown_destroys_flushed_pool() {
        let queue =
            WorkQueue::create("teardown_ok", ConcurrencyPolicy::default().unbound()).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let item = {
            let hits = Arc::clone(&hits);
            WorkItem::new("teardown_item", move || {
                thread::sleep(Duration::from_millis(20));
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        queue.submit(&item);
        assert!(teardown(queue));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_gives_up_on_armed_pool() {
        let queue = WorkQueue::create("teardown_armed", ConcurrencyPolicy::default().unbound())
            .unwrap();
        let item = DelayedWorkItem::new("never", || {});
        queue.submit_delayed(&item, Duration::from_secs(60));

        let started = Instant::now();
        assert!(!teardown(queue));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
