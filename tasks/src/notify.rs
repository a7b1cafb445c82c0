//! One-shot notification latch.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A (mutex, condvar, bool) cell that latches to `true` on the first
/// [`latch`] call and stays latched.
///
/// This is the cell a wait-any proxy shares with its notifiers and the cell
/// the operation state signals for `notify_when_ready` registrations.
///
/// [`latch`]: Self::latch
#[derive(Debug, Default)]
pub struct NotifyCell {
    set: Mutex<bool>,
    cvar: Condvar,
}

impl NotifyCell {
    pub fn new() -> Self {
        Self {
            set: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    /// Latches the cell and wakes one waiter.
    ///
    /// Latching an already latched cell has no effect.
    pub fn latch(&self) {
        let mut set = self.set.lock();
        if !*set {
            *set = true;
            self.cvar.notify_one();
        }
    }

    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Blocks until the cell is latched.
    pub fn wait(&self) {
        let mut set = self.set.lock();
        while !*set {
            self.cvar.wait(&mut set);
        }
    }

    /// Blocks until the cell is latched or `timeout` elapses.
    ///
    /// Returns `true` if the cell was latched.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }

    /// Blocks until the cell is latched or `deadline` is reached.
    ///
    /// Returns `true` if the cell was latched.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut set = self.set.lock();
        while !*set {
            if self.cvar.wait_until(&mut set, deadline).timed_out() {
                return *set;
            }
        }
        true
    }
}
