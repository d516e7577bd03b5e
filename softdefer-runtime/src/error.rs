//! Error types.

use std::io;

use thiserror::Error;

use crate::workqueue::WorkQueue;

#[derive(Debug, Error)]
pub enum WorkQueueError {
    #[error("failed to allocate workqueue `{name}`: {source}")]
    ResourceExhaustion {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("workqueue name must not be empty")]
    InvalidName,
}

/// Returned by [`WorkQueue::destroy`] when the pool is not quiescent.
///
/// Carries the queue back so the caller can flush and cancel, then retry.
#[derive(Debug, Error)]
#[error(
    "workqueue `{name}` still has {outstanding} outstanding item(s) \
     and {armed_timers} armed timer(s)"
)]
pub struct DestroyError {
    pub name: String,
    pub outstanding: usize,
    pub armed_timers: usize,
    pub(crate) queue: WorkQueue,
}

impl DestroyError {
    pub fn into_queue(self) -> WorkQueue {
        self.queue
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    WorkQueue(#[from] WorkQueueError),

    #[error("invalid parameters for module `{module}`: {source}")]
    Params {
        module: &'static str,
        #[source]
        source: ConfigError,
    },

    #[error("module `{module}` failed to start: {reason}")]
    Init { module: &'static str, reason: String },
}
