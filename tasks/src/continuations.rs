//! Thread-safe append-once / fire-once continuation list.

use std::panic::{catch_unwind, AssertUnwindSafe};

use executor::{ExecutorHandle, Job};
use parking_lot::{Mutex, RwLock};

/// List of nullary callbacks fired when an operation state becomes ready.
///
/// `request_run` flips the run-requested flag exactly once, invokes every
/// callback in insertion order and clears the list. Once the flag is set,
/// `emplace` no longer appends; the callback is scheduled on the supplied
/// executor instead.
#[derive(Default)]
pub struct ContinuationList {
    callbacks: Mutex<Vec<Job>>,
    run_requested: RwLock<bool>,
}

impl std::fmt::Debug for ContinuationList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationList")
            .field("run_requested", &self.run_requested())
            .finish_non_exhaustive()
    }
}

impl ContinuationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_requested(&self) -> bool {
        *self.run_requested.read()
    }

    /// Appends `callback`, or posts it on `executor` if the list already
    /// ran.
    ///
    /// Returns `true` iff the callback was appended.
    pub fn emplace(&self, executor: &ExecutorHandle, callback: Job) -> bool {
        let mut callbacks = self.callbacks.lock();
        if *self.run_requested.read() {
            drop(callbacks);
            executor.post(callback);
            false
        } else {
            callbacks.push(callback);
            true
        }
    }

    /// Runs all callbacks in insertion order and clears the list.
    ///
    /// Returns `false` if a run was already requested. Panics out of
    /// individual callbacks are swallowed; they have nowhere to surface.
    pub fn request_run(&self) -> bool {
        {
            // The flag lock is released before the list lock is taken;
            // `emplace` acquires them in the opposite order.
            let mut run_requested = self.run_requested.write();
            if *run_requested {
                return false;
            }
            *run_requested = true;
        }

        let mut callbacks = self.callbacks.lock();
        for callback in callbacks.drain(..) {
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                tracing::debug!("continuation panicked in request_run");
            }
        }
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::ContinuationList;

    #[test]
    fn run_in_insertion_order() {
        let list = ContinuationList::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let ex = executor::inline_executor();

        for i in 0..4 {
            let order = order.clone();
            assert!(list.emplace(&ex, Box::new(move || order.lock().unwrap().push(i))));
        }

        assert!(list.request_run());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn request_run_fires_once() {
        let list = ContinuationList::new();
        assert!(list.request_run());
        assert!(!list.request_run());
    }

    #[test]
    fn emplace_after_run_goes_through_executor() {
        let list = ContinuationList::new();
        let ex = executor::inline_executor();
        list.request_run();

        let ran = Arc::new(AtomicUsize::new(0));
        let emplaced = {
            let ran = ran.clone();
            list.emplace(
                &ex,
                Box::new(move || {
                    ran.fetch_add(1, Ordering::Relaxed);
                }),
            )
        };

        assert!(!emplaced);
        // The inline executor ran the callback before `emplace` returned.
        assert_eq!(ran.load(Ordering::Relaxed), 1);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn panicking_continuation_does_not_stop_the_rest() {
        let list = ContinuationList::new();
        let ex = executor::inline_executor();
        let ran = Arc::new(AtomicUsize::new(0));

        list.emplace(&ex, Box::new(|| panic!("boom")));
        {
            let ran = ran.clone();
            list.emplace(
                &ex,
                Box::new(move || {
                    ran.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }

        assert!(list.request_run());
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }
}
