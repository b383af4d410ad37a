//! Per-session guard enforcing at most one worker.

#[cfg(not(loom))]
use std::sync::Mutex;
use std::sync::PoisonError;

#[cfg(loom)]
use loom::sync::Mutex;

/// Records whether a worker has been attached to a session.
///
/// The flag is checked, the worker spawned and the flag set inside one
/// critical section, so concurrent binds of the same session start exactly
/// one worker.
pub struct WorkerSlot {
    attached: Mutex<bool>,
}

impl Default for WorkerSlot {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl WorkerSlot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            attached: Mutex::new(false),
        }
    }

    /// Run `spawn` if no worker is attached yet.
    ///
    /// Returns `true` when `spawn` ran.
    pub fn claim_with<F: FnOnce()>(&self, spawn: F) -> bool {
        let mut attached = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        if *attached {
            return false;
        }
        spawn();
        *attached = true;
        true
    }

    /// Whether a worker was attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
