/// Outcome of a schedule or submit request
///
/// Neither variant is an error. `AlreadyPending` means the request was
/// coalesced with one that is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// A new execution was queued
    Queued,
    /// An earlier request has not completed yet; nothing new was queued
    AlreadyPending,
}

impl QueueStatus {
    pub fn is_queued(self) -> bool {
        matches!(self, QueueStatus::Queued)
    }
}

/// Observable state of a [`CooperativeTask`](crate::CooperativeTask)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Scheduled,
    Running,
}
