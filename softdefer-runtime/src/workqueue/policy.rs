use serde::Deserialize;

use crate::context;

/// Concurrency used when `max_active` is left at zero.
pub const DEFAULT_MAX_ACTIVE: usize = 256;
/// Upper bound on worker threads for any single pool.
pub const MAX_ACTIVE_LIMIT: usize = 512;

/// How many workers a pool may run concurrently, and how they are placed
///
/// A bound pool allows `max_active` concurrent items per execution unit. An
/// unbound pool allows `max_active` in total. High priority pools are marked
/// with an `H` in their worker thread names.
///
/// # Example
///
/// ```rust
/// use softdefer_runtime::ConcurrencyPolicy;
///
/// let policy = ConcurrencyPolicy::default().unbound().high_priority().max_active(4);
/// assert_eq!(policy.worker_limit(), 4);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConcurrencyPolicy {
    pub max_active: usize,
    pub unbound: bool,
    pub high_priority: bool,
}

impl ConcurrencyPolicy {
    pub fn unbound(mut self) -> Self {
        self.unbound = true;
        self
    }

    pub fn high_priority(mut self) -> Self {
        self.high_priority = true;
        self
    }

    pub fn max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Worker threads the pool may run at once.
    pub fn worker_limit(&self) -> usize {
        let per_scope = match self.max_active {
            0 => DEFAULT_MAX_ACTIVE,
            n => n,
        };
        let total = if self.unbound {
            per_scope
        } else {
            per_scope.saturating_mul(context::unit_count())
        };
        total.clamp(1, MAX_ACTIVE_LIMIT)
    }

    pub(crate) fn thread_name(&self, queue: &str) -> String {
        let placement = if self.unbound { "u" } else { "" };
        let priority = if self.high_priority { "H" } else { "" };
        format!("kworker/{placement}{priority}:{queue}")
    }
}
