//! The operation state: the cell shared between one producer and its
//! consumers.
//!
//! The state carries the task outcome, the synchronization needed to block
//! on it, and the optional capabilities a future family may enable: a
//! continuation list, a stop source, an executor slot, and a deferred task.
//!
//! The lifecycle is a strict progression:
//!
//! ```text
//! deferred  →  launched  →  waiting  →  ready
//!                   ↘────────↗
//! ```
//!
//! The `waiting → launched` edge is taken by a timed wait that gave up.
//! Once `ready`, the outcome is never mutated again (a unique consumer may
//! move it out).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::Waker;
use std::time::{Duration, Instant};

use atomic_waker::AtomicWaker;
use executor::ExecutorHandle;
use parking_lot::{Condvar, Mutex};

use crate::continuations::ContinuationList;
use crate::error::{Error, WaitStatus};
use crate::notify::NotifyCell;
use crate::stop::StopSource;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Status {
    /// The task is stored and has not been launched.
    Deferred,
    /// The task has been launched (or the state is eager).
    Launched,
    /// Some thread is blocked on the condvar.
    Waiting,
    /// The outcome is stored and everyone has been notified.
    Ready,
}

/// The stored task of a deferred state. It receives the state so it can
/// deliver its outcome.
pub(crate) type TaskFn<T> = Box<dyn FnOnce(&Arc<State<T>>) + Send + 'static>;

struct Inner<T> {
    status: Status,
    // `Some` exactly from the ready transition until a unique consumer
    // moves the outcome out.
    outcome: Option<Result<T, Error>>,
    task: Option<TaskFn<T>>,
    // Parent of a deferred continuation; waited on before the task is
    // posted.
    parent: Option<Observer>,
    // External notification cells to latch when the state becomes ready.
    external: Vec<(u64, Arc<NotifyCell>)>,
    next_external: u64,
}

pub(crate) struct State<T> {
    inner: Mutex<Inner<T>>,
    cvar: Condvar,
    continuations: Option<Arc<ContinuationList>>,
    stop: Option<StopSource>,
    executor: Option<ExecutorHandle>,
    waker: AtomicWaker,
}

impl<T> State<T>
where
    T: Send + 'static,
{
    /// Creates a state in the `launched` status.
    pub fn eager(
        continuable: bool,
        stop: Option<StopSource>,
        executor: Option<ExecutorHandle>,
    ) -> Arc<Self> {
        Arc::new(Self::raw(Status::Launched, None, None, continuable, stop, executor))
    }

    /// Creates a state in the `deferred` status holding `task`.
    pub fn deferred(
        task: TaskFn<T>,
        parent: Option<Observer>,
        stop: Option<StopSource>,
        executor: Option<ExecutorHandle>,
    ) -> Arc<Self> {
        Arc::new(Self::raw(
            Status::Deferred,
            Some(task),
            parent,
            false,
            stop,
            executor,
        ))
    }

    /// Creates a state that is already `ready` with `outcome`.
    pub fn ready(outcome: Result<T, Error>) -> Arc<Self> {
        let state = Self::raw(Status::Ready, None, None, false, None, None);
        state.inner.lock().outcome = Some(outcome);
        Arc::new(state)
    }

    fn raw(
        status: Status,
        task: Option<TaskFn<T>>,
        parent: Option<Observer>,
        continuable: bool,
        stop: Option<StopSource>,
        executor: Option<ExecutorHandle>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                status,
                outcome: None,
                task,
                parent,
                external: Vec::new(),
                next_external: 0,
            }),
            cvar: Condvar::new(),
            continuations: continuable.then(|| Arc::new(ContinuationList::new())),
            stop,
            executor,
            waker: AtomicWaker::new(),
        }
    }

    pub fn continuations_arc(&self) -> Option<Arc<ContinuationList>> {
        self.continuations.clone()
    }

    pub fn stop_source(&self) -> Option<&StopSource> {
        self.stop.as_ref()
    }

    pub fn executor(&self) -> Option<&ExecutorHandle> {
        self.executor.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().status == Status::Ready
    }

    /// Stores the outcome and marks the state ready.
    ///
    /// Wakes the condvar waiters and the registered waker, latches every
    /// external notification cell and fires the continuation list.
    pub fn set_outcome(&self, outcome: Result<T, Error>) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.status == Status::Ready {
            return Err(Error::AlreadySatisfied);
        }

        inner.outcome = Some(outcome);
        inner.status = Status::Ready;
        for (_, cell) in &inner.external {
            cell.latch();
        }
        drop(inner);

        self.cvar.notify_all();
        self.waker.wake();

        // Continuations run outside the state mutex; a continuation is
        // allowed to re-enter this state.
        if let Some(continuations) = &self.continuations {
            continuations.request_run();
        }

        Ok(())
    }

    /// Marks the state broken if no outcome was delivered.
    ///
    /// Called when a producer goes away; losing the race against a late
    /// `set_outcome` is fine.
    pub fn set_broken(&self) {
        if !self.is_ready() {
            let _ = self.set_outcome(Err(Error::BrokenPromise));
        }
    }

    /// Runs `task`, catching panics, and delivers its result.
    ///
    /// This is the single choke point through which tasks reach the state.
    pub fn apply<F>(self: &Arc<Self>, task: F)
    where
        F: FnOnce() -> T,
    {
        let outcome = match catch_unwind(AssertUnwindSafe(task)) {
            Ok(value) => Ok(value),
            Err(payload) => Err(Error::from_panic(payload)),
        };
        let _ = self.set_outcome(outcome);
    }

    /// Blocks until the state is ready, launching a deferred task first.
    pub fn wait(self: &Arc<Self>) {
        let _ = self.wait_deadline(None);
    }

    /// Blocks until the state is ready or `timeout` elapses.
    pub fn wait_timeout(self: &Arc<Self>, timeout: Duration) -> WaitStatus {
        self.wait_deadline(Some(Instant::now() + timeout))
    }

    /// Blocks until the state is ready or `deadline` is reached.
    pub fn wait_until(self: &Arc<Self>, deadline: Instant) -> WaitStatus {
        self.wait_deadline(Some(deadline))
    }

    fn wait_deadline(self: &Arc<Self>, deadline: Option<Instant>) -> WaitStatus {
        let mut inner = self.inner.lock();
        loop {
            match inner.status {
                Status::Ready => return WaitStatus::Ready,
                Status::Deferred => {
                    inner.status = Status::Launched;
                    let task = inner.task.take();
                    let parent = inner.parent.take();
                    drop(inner);

                    // The mutex is released while waiting for the parent
                    // and while posting: both may call back into user
                    // code or block for a long time.
                    if let Some(parent) = parent {
                        parent.wait_ready();
                    }
                    if let Some(task) = task {
                        self.post_deferred(task);
                    }

                    inner = self.inner.lock();
                }
                Status::Launched | Status::Waiting => {
                    inner.status = Status::Waiting;
                    match deadline {
                        None => {
                            self.cvar.wait(&mut inner);
                        }
                        Some(deadline) => {
                            let result = self.cvar.wait_until(&mut inner, deadline);
                            if inner.status == Status::Ready {
                                return WaitStatus::Ready;
                            }
                            if result.timed_out() {
                                // The waiter gave up; the task keeps
                                // running.
                                inner.status = Status::Launched;
                                return WaitStatus::Timeout;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Launches a deferred task from a `poll` context.
    ///
    /// Unlike `wait_deadline` this does not block on the condvar, but it
    /// still waits for a deferred continuation's parent and runs the task
    /// inline when no executor is stored.
    pub fn poll_launch(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.status != Status::Deferred {
            return;
        }
        inner.status = Status::Launched;
        let task = inner.task.take();
        let parent = inner.parent.take();
        drop(inner);

        if let Some(parent) = parent {
            parent.wait_ready();
        }
        if let Some(task) = task {
            self.post_deferred(task);
        }
    }

    /// Posts the stored task on the stored executor, or runs it inline on
    /// the calling thread when no executor is stored. Called exactly once.
    fn post_deferred(self: &Arc<Self>, task: TaskFn<T>) {
        match &self.executor {
            Some(executor) => {
                let state = self.clone();
                let guard = ProducerGuard::new(state.clone());
                executor.post(Box::new(move || {
                    task(&state);
                    guard.disarm();
                }));
            }
            None => task(self),
        }
    }

    /// Waits, then moves the outcome out. Unique consumers only.
    pub fn take_outcome(self: &Arc<Self>) -> Result<T, Error> {
        self.wait();
        match self.inner.lock().outcome.take() {
            Some(outcome) => outcome,
            None => Err(Error::NoState),
        }
    }

    /// Waits, then clones the outcome. Shared consumers; idempotent.
    pub fn clone_outcome(self: &Arc<Self>) -> Result<T, Error>
    where
        T: Clone,
    {
        self.wait();
        match &self.inner.lock().outcome {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(err)) => Err(err.clone()),
            None => Err(Error::NoState),
        }
    }

    /// Returns the stored error of a ready, failed state.
    pub fn peek_error(&self) -> Option<Error> {
        match &self.inner.lock().outcome {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Registers an external notification cell, promoting a deferred
    /// state to launched first.
    ///
    /// If the state is already ready the cell is latched immediately; a
    /// handle is still returned and may be passed to
    /// [`unnotify_when_ready`].
    ///
    /// [`unnotify_when_ready`]: Self::unnotify_when_ready
    pub fn notify_when_ready(self: &Arc<Self>, cell: Arc<NotifyCell>) -> u64 {
        let mut inner = self.inner.lock();
        if inner.status == Status::Deferred {
            inner.status = Status::Launched;
            let task = inner.task.take();
            let parent = inner.parent.take();
            drop(inner);

            if let Some(parent) = parent {
                parent.wait_ready();
            }
            if let Some(task) = task {
                self.post_deferred(task);
            }

            inner = self.inner.lock();
        }

        if inner.status == Status::Ready {
            cell.latch();
        }
        let id = inner.next_external;
        inner.next_external += 1;
        inner.external.push((id, cell));
        id
    }

    /// Removes a registration made with [`notify_when_ready`].
    ///
    /// [`notify_when_ready`]: Self::notify_when_ready
    pub fn unnotify_when_ready(&self, id: u64) {
        self.inner.lock().external.retain(|(i, _)| *i != id);
    }

    /// Registers the waker woken when the state becomes ready.
    pub fn register_waker(&self, waker: &Waker) {
        self.waker.register(waker);
    }
}

impl<T> Drop for State<T> {
    fn drop(&mut self) {
        // A stoppable state going away means nobody can deliver or
        // observe a result anymore; wake any registered stop callbacks.
        if let Some(stop) = &self.stop {
            stop.request_stop();
        }
    }
}

impl<T> std::fmt::Debug for State<T>
where
    T: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a state for notifiers and deferred parents.
///
/// Observers hold the state by `Arc`, so they stay valid regardless of
/// where the observed future handle moves.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<dyn Observe>,
}

impl Observer {
    pub(crate) fn from_state<T: Send + 'static>(state: Arc<State<T>>) -> Self {
        Self { inner: state }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.observe_is_ready()
    }

    /// Blocks until the observed state is ready, launching it if it is
    /// deferred.
    pub fn wait_ready(&self) {
        self.inner.clone().observe_wait();
    }

    /// Bounded wait; returns `true` if the state became ready.
    pub fn wait_ready_for(&self, timeout: Duration) -> bool {
        self.inner.clone().observe_wait_for(timeout)
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("ready", &self.is_ready())
            .finish()
    }
}

trait Observe: Send + Sync {
    fn observe_is_ready(&self) -> bool;
    fn observe_wait(self: Arc<Self>);
    fn observe_wait_for(self: Arc<Self>, timeout: Duration) -> bool;
}

impl<T: Send + 'static> Observe for State<T> {
    fn observe_is_ready(&self) -> bool {
        self.is_ready()
    }

    fn observe_wait(self: Arc<Self>) {
        self.wait();
    }

    fn observe_wait_for(self: Arc<Self>, timeout: Duration) -> bool {
        self.wait_timeout(timeout).is_ready()
    }
}

/// Marks the state broken if the producer is dropped without delivering.
///
/// Executor jobs are producers too: an executor that drops a job without
/// running it must not leave waiters blocked forever.
pub(crate) struct ProducerGuard<T: Send + 'static> {
    state: Option<Arc<State<T>>>,
}

impl<T: Send + 'static> ProducerGuard<T> {
    pub fn new(state: Arc<State<T>>) -> Self {
        Self { state: Some(state) }
    }

    /// The producer delivered; dropping the guard is a no-op from here.
    pub fn disarm(mut self) {
        self.state = None;
    }
}

impl<T: Send + 'static> Drop for ProducerGuard<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.set_broken();
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::State;
    use crate::error::{Error, WaitStatus};
    use crate::notify::NotifyCell;

    #[test]
    fn set_then_take() {
        let state = State::eager(false, None, None);
        state.set_outcome(Ok(7)).unwrap();
        assert!(state.is_ready());
        assert_eq!(state.take_outcome(), Ok(7));
    }

    #[test]
    fn double_set_fails() {
        let state = State::eager(false, None, None);
        state.set_outcome(Ok(1)).unwrap();
        assert_eq!(state.set_outcome(Ok(2)), Err(Error::AlreadySatisfied));
        // The first outcome is untouched.
        assert_eq!(state.take_outcome(), Ok(1));
    }

    #[test]
    fn wait_timeout_on_unready() {
        let state = State::<u32>::eager(false, None, None);
        assert_eq!(
            state.wait_timeout(Duration::from_millis(1)),
            WaitStatus::Timeout
        );
        // A later producer still gets through.
        state.set_outcome(Ok(3)).unwrap();
        assert_eq!(state.wait_timeout(Duration::from_millis(1)), WaitStatus::Ready);
    }

    #[test]
    fn wait_wakes_on_set() {
        let state = State::eager(false, None, None);
        let waiter = {
            let state = state.clone();
            std::thread::spawn(move || state.take_outcome())
        };

        std::thread::sleep(Duration::from_millis(10));
        state.set_outcome(Ok(11)).unwrap();
        assert_eq!(waiter.join().unwrap(), Ok(11));
    }

    #[test]
    fn deferred_runs_inline_on_first_wait() {
        let state = State::deferred(
            Box::new(|state: &Arc<State<u32>>| {
                let _ = state.set_outcome(Ok(42));
            }),
            None,
            None,
            None,
        );

        assert!(!state.is_ready());
        assert_eq!(state.take_outcome(), Ok(42));
    }

    #[test]
    fn notify_when_ready_latches() {
        let state = State::eager(false, None, None);
        let cell = Arc::new(NotifyCell::new());
        let id = state.notify_when_ready(cell.clone());

        assert!(!cell.is_set());
        state.set_outcome(Ok(())).unwrap();
        assert!(cell.is_set());
        state.unnotify_when_ready(id);
    }

    #[test]
    fn notify_when_ready_on_ready_state() {
        let state = State::ready(Ok(1));
        let cell = Arc::new(NotifyCell::new());
        let _id = state.notify_when_ready(cell.clone());
        assert!(cell.is_set());
    }

    #[test]
    fn unnotified_cell_stays_unset() {
        let state = State::eager(false, None, None);
        let cell = Arc::new(NotifyCell::new());
        let id = state.notify_when_ready(cell.clone());
        state.unnotify_when_ready(id);

        state.set_outcome(Ok(())).unwrap();
        assert!(!cell.is_set());
    }

    #[test]
    fn observer_sees_state() {
        let state = State::eager(false, None, None);
        let observer = super::Observer::from_state(state.clone());
        assert!(!observer.is_ready());
        assert!(!observer.wait_ready_for(Duration::from_millis(1)));

        state.set_outcome(Ok(5)).unwrap();
        assert!(observer.is_ready());
        observer.wait_ready();
    }

    #[test]
    fn producer_guard_breaks_promise() {
        let state = State::<u32>::eager(false, None, None);
        let guard = super::ProducerGuard::new(state.clone());
        drop(guard);
        assert_eq!(state.take_outcome(), Err(Error::BrokenPromise));
    }
}
