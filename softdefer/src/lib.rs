//! # Softdefer - Deferred Execution for Rust
//!
//! Three ways to move work off the caller's path, each with a
//! schedule / execute / drain contract:
//!
//! - **Deferred callbacks**: run very soon on the caller's own execution
//!   unit, in a restricted context that must not block. Duplicate requests
//!   coalesce into one run.
//! - **Cooperative tasks**: reusable restricted-context tasks that never run
//!   concurrently with themselves and can be killed.
//! - **Work queues**: worker pools, shared or dedicated, running items now or
//!   after a delay. Workers may block.
//!
//! ## Quick Start
//!
//! ```rust
//! use softdefer::{cooperative_task, work_item, schedule_work, flush_scheduled_work};
//!
//! #[cooperative_task]
//! fn refresh() {
//!     tracing::info!(unit = softdefer::context::current_unit(), "refreshing");
//! }
//!
//! #[work_item]
//! fn write_back() {
//!     tracing::info!("writing back");
//! }
//!
//! REFRESH.schedule();
//! schedule_work(&WRITE_BACK);
//!
//! // Before going away: no run may be left pending.
//! REFRESH.kill();
//! flush_scheduled_work();
//! ```
//!
//! ## Modules
//!
//! A [`DeferralModule`] bundles work scheduled at load time with the cleanup
//! that must happen at unload. Parameters come from the module's table in a
//! TOML or YAML file, overridable from `SOFTDEFER_*` environment variables:
//!
//! ```toml
//! [ex_tasklets]
//! times = 5
//! spacing = "20ms"
//! ```
//!
//! ```bash
//! export SOFTDEFER_EX_TASKLETS__TIMES=10
//! ```
//!
//! ```rust,no_run
//! use softdefer::ModuleHostBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loaded = ModuleHostBuilder::with_toml("config/softdefer.toml")?
//!         .discover()
//!         .build()
//!         .load();
//!
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     loaded.unload();
//!     Ok(())
//! }
//! ```

extern crate self as softdefer;

pub mod demo;

// Re-export macros
pub use softdefer_macro::{
    cooperative_task, deferral_module, deferred_callback, delayed_work_item, work_item,
};

// Re-export core types
pub use softdefer_runtime::{
    context, deserialize_delay, flush_scheduled_work, load_env_config, load_toml_config,
    load_yaml_config, module_params, parse_delay, schedule_delayed_work, schedule_work, system_wq,
    ConcurrencyPolicy, ConfigError, CooperativeTask, DeferralModule, DeferredCallback,
    DelayedWorkItem, DestroyError, LoadedModules, ModuleEntry, ModuleError, ModuleHost,
    ModuleHostBuilder, QueueStatus, Runnable, TaskState, TimeUnit, WorkItem, WorkQueue,
    WorkQueueError, DEFAULT_MAX_ACTIVE, ENV_PREFIX, MAX_ACTIVE_LIMIT, SYSTEM_WQ_NAME,
};

// Make softdefer_runtime available for macro expansion
pub use softdefer_runtime;
