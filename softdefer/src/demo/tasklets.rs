use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::context::current_unit;
use crate::{cooperative_task, deferral_module, deserialize_delay, DeferralModule, ModuleError};

static EXECUTIONS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskletParams {
    pub times: u32,
    #[serde(deserialize_with = "deserialize_delay")]
    pub spacing: Duration,
}

impl Default for TaskletParams {
    fn default() -> Self {
        Self {
            times: 3,
            spacing: Duration::from_millis(50),
        }
    }
}

#[cooperative_task]
pub fn demo_tasklet() {
    EXECUTIONS.fetch_add(1, Ordering::SeqCst);
    info!(unit = current_unit(), "ex_tasklets: tasklet executed");
}

pub fn executions() -> usize {
    EXECUTIONS.load(Ordering::SeqCst)
}

/// Schedules [`DEMO_TASKLET`] `times` times; kills it on unload
#[derive(Debug)]
pub struct ExTasklets;

#[deferral_module(name = "ex_tasklets")]
impl DeferralModule for ExTasklets {
    type Params = TaskletParams;

    fn init(params: TaskletParams) -> Result<Self, ModuleError> {
        info!(times = params.times, "ex_tasklets: init, scheduling tasklet");
        for i in 1..=params.times {
            let status = DEMO_TASKLET.schedule();
            info!(n = i, times = params.times, ?status, "ex_tasklets: scheduled tasklet");
            thread::sleep(params.spacing);
        }
        Ok(ExTasklets)
    }

    fn exit(self) {
        DEMO_TASKLET.kill();
        info!("ex_tasklets: exit (tasklet killed)");
    }
}
