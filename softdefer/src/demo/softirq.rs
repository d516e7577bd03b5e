use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::context::{current_unit, in_restricted_context};
use crate::{deferral_module, deferred_callback, deserialize_delay, DeferralModule, ModuleError};

static EXECUTIONS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SoftirqParams {
    /// How many times to schedule the callback at load
    pub times: u32,
    /// Pause between schedules
    #[serde(deserialize_with = "deserialize_delay")]
    pub spacing: Duration,
}

impl Default for SoftirqParams {
    fn default() -> Self {
        Self {
            times: 3,
            spacing: Duration::from_millis(50),
        }
    }
}

/// Runs on the scheduling thread's execution unit; must stay short.
#[deferred_callback]
pub fn demo_irq_work() {
    let run = EXECUTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    info!(
        unit = current_unit(),
        restricted = in_restricted_context(),
        run,
        "ex_softirq: callback ran"
    );
}

/// Callback executions since the process started.
pub fn executions() -> usize {
    EXECUTIONS.load(Ordering::SeqCst)
}

/// Schedules [`DEMO_IRQ_WORK`] `times` times; drains it on unload
#[derive(Debug)]
pub struct ExSoftirq;

#[deferral_module(name = "ex_softirq")]
impl DeferralModule for ExSoftirq {
    type Params = SoftirqParams;

    fn init(params: SoftirqParams) -> Result<Self, ModuleError> {
        info!(times = params.times, "ex_softirq: init, queuing callback");
        for i in 1..=params.times {
            let status = DEMO_IRQ_WORK.schedule();
            info!(n = i, times = params.times, ?status, "ex_softirq: queued callback");
            thread::sleep(params.spacing);
        }
        Ok(ExSoftirq)
    }

    fn exit(self) {
        DEMO_IRQ_WORK.drain();
        info!("ex_softirq: exit (callback drained)");
    }
}
