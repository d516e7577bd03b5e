//! Demo modules, one per deferral mechanism.
//!
//! Each schedules a bounded burst of work when loaded and leaves nothing
//! pending when unloaded. All three register themselves for
//! [`ModuleHostBuilder::discover`](crate::ModuleHostBuilder::discover).

pub mod softirq;
pub mod tasklets;
pub mod workqueue;

pub use softirq::{ExSoftirq, SoftirqParams};
pub use tasklets::{ExTasklets, TaskletParams};
pub use workqueue::{ExWorkqueue, WorkqueueParams};
