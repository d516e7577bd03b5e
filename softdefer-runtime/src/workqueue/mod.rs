mod delayed;
mod item;
mod policy;
mod queue;
mod system;

pub use delayed::DelayedWorkItem;
pub use item::WorkItem;
pub use policy::{ConcurrencyPolicy, DEFAULT_MAX_ACTIVE, MAX_ACTIVE_LIMIT};
pub use queue::WorkQueue;
pub use system::{
    flush_scheduled_work, schedule_delayed_work, schedule_work, system_wq, SYSTEM_WQ_NAME,
};
