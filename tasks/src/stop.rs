//! Cooperative cancellation.
//!
//! A [`StopSource`] may issue a stop request; a [`StopToken`] may only
//! observe it. Both are views of a shared stop state. Once stopped, the
//! state never clears, and `request_stop` reports `true` to exactly one
//! of any number of concurrent callers. Callbacks registered through
//! [`StopToken::on_stop`] run when stop is requested; registering after
//! the fact runs the callback inline.

use std::sync::Arc;
use std::thread::{self, ThreadId};

#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, AtomicU64, Ordering};
#[cfg(loom)]
use loom::sync::Mutex;
#[cfg(not(loom))]
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
#[cfg(not(loom))]
use std::sync::Mutex;

/// Bit 0 of the control word: stop has been requested.
const STOP_REQUESTED: u64 = 1;
/// Source count increment. The remaining bits of the control word count
/// live [`StopSource`] handles; token handles are counted by the `Arc`.
const SOURCE_REF: u64 = 2;

type Callback = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct StopState {
    // Control word. Lock-free readers use it for `stop_requested` and
    // `stop_possible`; the one-winner decision in `request_stop` happens
    // under the callback mutex so registration cannot race the drain.
    state: AtomicU64,
    callbacks: Mutex<Vec<Arc<CallbackNode>>>,
    // Thread that won `request_stop`. Read by a callback deregistering
    // itself from inside its own invocation.
    signaller: Mutex<Option<ThreadId>>,
}

impl std::fmt::Debug for StopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopState")
            .field("stop_requested", &self.stop_requested())
            .field("stop_possible", &self.stop_possible())
            .finish_non_exhaustive()
    }
}

struct CallbackNode {
    func: Mutex<Option<Callback>>,
    finished: AtomicBool,
}

impl std::fmt::Debug for CallbackNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackNode")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl CallbackNode {
    fn execute(&self) {
        let func = self.func.lock().unwrap().take();
        if let Some(func) = func {
            func();
        }
    }
}

impl StopState {
    fn new() -> Self {
        Self {
            state: AtomicU64::new(SOURCE_REF),
            callbacks: Mutex::new(Vec::new()),
            signaller: Mutex::new(None),
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) & STOP_REQUESTED != 0
    }

    pub fn stop_possible(&self) -> bool {
        let state = self.state.load(Ordering::Acquire);
        state & STOP_REQUESTED != 0 || state >= SOURCE_REF
    }

    fn add_source_ref(&self) {
        self.state.fetch_add(SOURCE_REF, Ordering::Relaxed);
    }

    fn remove_source_ref(&self) {
        self.state.fetch_sub(SOURCE_REF, Ordering::AcqRel);
    }

    /// Requests a stop and drains the callback list.
    ///
    /// Returns `true` for exactly one caller; every subsequent call is a
    /// no-op returning `false`.
    pub fn request_stop(&self) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap();

        let old = self.state.fetch_or(STOP_REQUESTED, Ordering::AcqRel);
        if old & STOP_REQUESTED != 0 {
            return false;
        }

        *self.signaller.lock().unwrap() = Some(thread::current().id());

        // Drain one callback at a time with the list lock released around
        // the invocation so that callbacks may register or deregister
        // other callbacks without deadlocking.
        loop {
            if callbacks.is_empty() {
                break;
            }
            let node = callbacks.remove(0);
            drop(callbacks);

            node.execute();
            node.finished.store(true, Ordering::Release);

            callbacks = self.callbacks.lock().unwrap();
        }

        true
    }

    /// Links `callback` into the list, or runs it inline if stop was
    /// already requested.
    ///
    /// Returns the linked node, or `None` if the callback was consumed
    /// inline or can never run (stop is impossible).
    fn add_callback(&self, callback: Callback) -> Option<Arc<CallbackNode>> {
        let mut callbacks = self.callbacks.lock().unwrap();

        if self.stop_requested() {
            drop(callbacks);
            callback();
            return None;
        }
        if !self.stop_possible() {
            return None;
        }

        let node = Arc::new(CallbackNode {
            func: Mutex::new(Some(callback)),
            finished: AtomicBool::new(false),
        });
        callbacks.push(node.clone());
        Some(node)
    }

    /// Unlinks `node` if it has not run yet.
    ///
    /// If the callback is currently executing on another thread, blocks
    /// until it finishes. If it is executing on the current thread (the
    /// callback is deregistering itself), returns immediately.
    fn remove_callback(&self, node: &Arc<CallbackNode>) {
        let mut callbacks = self.callbacks.lock().unwrap();
        if let Some(pos) = callbacks.iter().position(|n| Arc::ptr_eq(n, node)) {
            callbacks.remove(pos);
            return;
        }
        drop(callbacks);

        // Already executed or executing concurrently.
        if *self.signaller.lock().unwrap() == Some(thread::current().id()) {
            return;
        }

        while !node.finished.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }
}

/// Handle used to issue a stop request.
///
/// A stop requested through any clone of a source is visible to every
/// clone and every token derived from them.
#[derive(Debug)]
pub struct StopSource {
    state: Arc<StopState>,
}

impl StopSource {
    pub fn new() -> Self {
        Self {
            state: Arc::new(StopState::new()),
        }
    }

    /// Requests a stop. Returns `true` iff this call was the transition.
    pub fn request_stop(&self) -> bool {
        self.state.request_stop()
    }

    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }

    pub fn stop_possible(&self) -> bool {
        true
    }

    /// Returns a token observing this source.
    pub fn token(&self) -> StopToken {
        StopToken {
            state: self.state.clone(),
        }
    }
}

impl Clone for StopSource {
    fn clone(&self) -> Self {
        self.state.add_source_ref();
        Self {
            state: self.state.clone(),
        }
    }
}

impl Drop for StopSource {
    fn drop(&mut self) {
        self.state.remove_source_ref();
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for StopSource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for StopSource {}

/// Handle used to observe a stop request.
#[derive(Clone, Debug)]
pub struct StopToken {
    state: Arc<StopState>,
}

impl StopToken {
    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }

    /// `false` once every source is gone without a stop request; such a
    /// token can never observe a stop.
    pub fn stop_possible(&self) -> bool {
        self.state.stop_possible()
    }

    /// Registers `callback` to run when stop is requested.
    ///
    /// If stop was already requested, `callback` runs inline on the
    /// calling thread. If stop can never be requested, `callback` is
    /// discarded. Both cases return `None`; otherwise the returned guard
    /// keeps the registration alive and deregisters on drop.
    pub fn on_stop<F>(&self, callback: F) -> Option<StopCallback>
    where
        F: FnOnce() + Send + 'static,
    {
        let node = self.state.add_callback(Box::new(callback))?;
        Some(StopCallback {
            state: self.state.clone(),
            node,
        })
    }
}

impl PartialEq for StopToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for StopToken {}

/// RAII registration of a stop callback.
///
/// Dropping the guard deregisters the callback. If the callback is
/// executing on another thread at that moment, the drop blocks until the
/// callback finishes; a callback dropping its own guard from inside its
/// invocation does not block.
#[derive(Debug)]
pub struct StopCallback {
    state: Arc<StopState>,
    node: Arc<CallbackNode>,
}

impl Drop for StopCallback {
    fn drop(&mut self) {
        self.state.remove_callback(&self.node);
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::StopSource;

    #[test]
    fn request_stop_transitions_once() {
        let source = StopSource::new();
        assert!(!source.stop_requested());
        assert!(source.request_stop());
        assert!(!source.request_stop());
        assert!(source.stop_requested());
    }

    #[test]
    fn all_copies_observe_stop() {
        let source = StopSource::new();
        let copy = source.clone();
        let token = source.token();

        assert!(copy.request_stop());
        assert!(source.stop_requested());
        assert!(token.stop_requested());
    }

    #[test]
    fn stop_possible_after_sources_gone() {
        let source = StopSource::new();
        let token = source.token();
        assert!(token.stop_possible());

        drop(source);
        assert!(!token.stop_possible());
        assert!(!token.stop_requested());
    }

    #[test]
    fn stop_stays_requestable_after_sources_gone() {
        let source = StopSource::new();
        let token = source.token();
        source.request_stop();
        drop(source);

        assert!(token.stop_requested());
        assert!(token.stop_possible());
    }

    #[test]
    fn callbacks_run_on_stop_in_order() {
        let source = StopSource::new();
        let token = source.token();

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let a = {
            let order = order.clone();
            token.on_stop(move || order.lock().unwrap().push(1)).unwrap()
        };
        let b = {
            let order = order.clone();
            token.on_stop(move || order.lock().unwrap().push(2)).unwrap()
        };

        source.request_stop();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);

        drop(a);
        drop(b);
    }

    #[test]
    fn callback_after_stop_runs_inline() {
        let source = StopSource::new();
        let token = source.token();
        source.request_stop();

        let ran = Arc::new(AtomicUsize::new(0));
        let guard = {
            let ran = ran.clone();
            token.on_stop(move || {
                ran.fetch_add(1, Ordering::Relaxed);
            })
        };

        assert!(guard.is_none());
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn deregistered_callback_does_not_run() {
        let source = StopSource::new();
        let token = source.token();

        let ran = Arc::new(AtomicUsize::new(0));
        let guard = {
            let ran = ran.clone();
            token
                .on_stop(move || {
                    ran.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap()
        };

        drop(guard);
        source.request_stop();
        assert_eq!(ran.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn callback_on_impossible_token_is_discarded() {
        let source = StopSource::new();
        let token = source.token();
        drop(source);

        let guard = token.on_stop(|| panic!("must not run"));
        assert!(guard.is_none());
    }

    #[test]
    fn concurrent_request_stop_single_winner() {
        let source = Arc::new(StopSource::new());
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let source = source.clone();
                let wins = wins.clone();
                std::thread::spawn(move || {
                    if source.request_stop() {
                        wins.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::Relaxed), 1);
    }
}
