//! Softdefer Runtime - Core runtime for deferred execution
//!
//! This crate provides three ways to push work off the caller's path:
//!
//! - [`DeferredCallback`]: runs very soon on the caller's own execution unit,
//!   in a restricted non-blocking context, coalescing duplicate requests.
//! - [`CooperativeTask`]: a reusable restricted-context task with `kill`.
//! - [`WorkQueue`]: worker pools (shared or dedicated) running [`WorkItem`]s
//!   immediately or after a delay.
//!
//! All three share one contract: schedule, execute, and drain before the
//! owning component goes away.

mod callback;
mod config;
pub mod context;
mod error;
mod module;
mod quiesce;
mod runnable;
mod status;
mod tasklet;
mod time_unit;
mod workqueue;

// Re-export public API
pub use callback::DeferredCallback;
pub use self::config::{
    load_env_config, load_toml_config, load_yaml_config, module_params, ENV_PREFIX,
};
pub use error::{ConfigError, DestroyError, ModuleError, WorkQueueError};
pub use linkme;
pub use module::{
    DeferralModule, LoadedModules, ModuleEntry, ModuleHost, ModuleHostBuilder, MODULES,
};
pub use runnable::Runnable;
pub use status::{QueueStatus, TaskState};
pub use tasklet::CooperativeTask;
pub use time_unit::{deserialize_delay, parse_delay, TimeUnit};
pub use workqueue::{
    flush_scheduled_work, schedule_delayed_work, schedule_work, system_wq, ConcurrencyPolicy,
    DelayedWorkItem, WorkItem, WorkQueue, DEFAULT_MAX_ACTIVE, MAX_ACTIVE_LIMIT, SYSTEM_WQ_NAME,
};
