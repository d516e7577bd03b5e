use parking_lot::{Condvar, Mutex};

/// Parks threads until a condition published by lock-free state holds.
///
/// The condition itself lives in atomics owned by the caller. Waiters
/// re-check it under `lock`, and notifiers take `lock` before waking, so a
/// state change can never slip between a check and the park.
pub(crate) struct Quiescence {
    lock: Mutex<()>,
    changed: Condvar,
}

impl Quiescence {
    pub(crate) const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn wait_until(&self, mut settled: impl FnMut() -> bool) {
        let mut guard = self.lock.lock();
        while !settled() {
            self.changed.wait(&mut guard);
        }
    }

    pub(crate) fn notify(&self) {
        let _guard = self.lock.lock();
        self.changed.notify_all();
    }
}
