//! Thread parking primitive used by the pool workers.
//!
//! The parker carries a token: `unpark` deposits it, `park` consumes it.
//! An `unpark` that arrives before `park` makes the next `park` return
//! immediately instead of being lost. This is what makes the registration
//! protocol in the pool race-free without holding a lock around the park.

#[cfg(loom)]
use loom::sync::{Condvar, Mutex};
#[cfg(not(loom))]
use std::sync::{Condvar, Mutex};

#[cfg(not(loom))]
use std::time::Duration;

pub struct Parker {
    // `true` while the token is deposited.
    token: Mutex<bool>,
    cvar: Condvar,
}

impl std::fmt::Debug for Parker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parker").finish_non_exhaustive()
    }
}

impl Parker {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    /// Blocks the calling thread until the token is deposited, then
    /// consumes it.
    pub fn park(&self) {
        let mut token = self.token.lock().unwrap();
        while !*token {
            token = self.cvar.wait(token).unwrap();
        }
        *token = false;
    }

    /// Like [`park`], but gives up after `timeout`.
    ///
    /// Returns `true` if the token was consumed, `false` on timeout.
    ///
    /// [`park`]: Self::park
    #[cfg(not(loom))]
    pub fn park_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;

        let mut token = self.token.lock().unwrap();
        while !*token {
            let now = std::time::Instant::now();
            let Some(remaining) = deadline.checked_duration_since(now).filter(|d| !d.is_zero())
            else {
                return false;
            };

            let (guard, _) = self.cvar.wait_timeout(token, remaining).unwrap();
            token = guard;
        }

        *token = false;
        true
    }

    /// Deposits the token and wakes the parked thread, if any.
    pub fn unpark(&self) {
        let mut token = self.token.lock().unwrap();
        *token = true;
        drop(token);
        self.cvar.notify_one();
    }
}

impl Default for Parker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::Parker;

    #[test]
    fn unpark_before_park() {
        let parker = Parker::new();
        parker.unpark();
        // Token was deposited, so this must not block.
        parker.park();
    }

    #[test]
    fn park_timeout_times_out() {
        let parker = Parker::new();
        assert!(!parker.park_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn unpark_wakes_parked_thread() {
        let parker = Arc::new(Parker::new());
        let handle = {
            let parker = parker.clone();
            std::thread::spawn(move || {
                parker.park();
            })
        };

        parker.unpark();
        handle.join().unwrap();
    }
}
