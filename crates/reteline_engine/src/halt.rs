//! Cross-thread halt signal.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Signal {
    halted: Mutex<bool>,
    wake: Condvar,
}

/// Requests that a session stop firing.
///
/// Cloneable and `Send`; the only part of a session meant to be touched from
/// another thread. A halt takes effect between firings and is consumed by the
/// execution loop that observes it.
#[derive(Clone, Debug, Default)]
pub struct HaltHandle {
    signal: Arc<Signal>,
}

impl HaltHandle {
    /// Creates a handle with no pending halt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a halt and wakes a waiting loop.
    pub fn halt(&self) {
        let mut halted = self.signal.halted.lock();
        *halted = true;
        self.signal.wake.notify_all();
    }

    /// True if a halt is pending.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        *self.signal.halted.lock()
    }

    /// Consumes a pending halt.
    pub(crate) fn take(&self) -> bool {
        std::mem::replace(&mut *self.signal.halted.lock(), false)
    }

    /// Blocks until a halt is pending. Does not consume it.
    pub(crate) fn wait(&self) {
        let mut halted = self.signal.halted.lock();
        while !*halted {
            self.signal.wake.wait(&mut halted);
        }
    }
}
