//! Launch functions: eager (`spawn`), deferred (`schedule`) and ready
//! futures.

use executor::{default_executor, ExecutorHandle};

use crate::error::Error;
use crate::future::{
    ContinuableFuture, DeferredFuture, ReadyFuture, StoppableDeferredFuture, StoppableFuture,
};
use crate::state::{ProducerGuard, State, TaskFn};
use crate::stop::{StopSource, StopToken};

/// Runs `task` on the default executor and returns a continuable future
/// observing it.
pub fn spawn<T, F>(task: F) -> ContinuableFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    spawn_on(&default_executor(), task)
}

/// Runs `task` on `executor` and returns a continuable future observing
/// it.
pub fn spawn_on<T, F>(executor: &ExecutorHandle, task: F) -> ContinuableFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let state = State::eager(true, None, Some(executor.clone()));

    let job_state = state.clone();
    let guard = ProducerGuard::new(state.clone());
    executor.post(Box::new(move || {
        job_state.apply(task);
        guard.disarm();
    }));

    ContinuableFuture::from_state(state)
}

/// Runs `task` on the default executor, handing it a stop token derived
/// from the future's stop source.
pub fn spawn_stoppable<T, F>(task: F) -> StoppableFuture<T>
where
    T: Send + 'static,
    F: FnOnce(StopToken) -> T + Send + 'static,
{
    spawn_stoppable_on(&default_executor(), task)
}

/// Runs `task` on `executor`, handing it a stop token derived from the
/// future's stop source.
pub fn spawn_stoppable_on<T, F>(executor: &ExecutorHandle, task: F) -> StoppableFuture<T>
where
    T: Send + 'static,
    F: FnOnce(StopToken) -> T + Send + 'static,
{
    let source = StopSource::new();
    let token = source.token();
    let state = State::eager(true, Some(source), Some(executor.clone()));

    let job_state = state.clone();
    let guard = ProducerGuard::new(state.clone());
    executor.post(Box::new(move || {
        job_state.apply(move || task(token));
        guard.disarm();
    }));

    StoppableFuture::from_state(state)
}

/// Stores `task` in a deferred future bound to the default executor.
///
/// The task is posted on the executor when the future is first waited on.
pub fn schedule<T, F>(task: F) -> DeferredFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    schedule_on(&default_executor(), task)
}

/// Stores `task` in a deferred future bound to `executor`.
pub fn schedule_on<T, F>(executor: &ExecutorHandle, task: F) -> DeferredFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let task: TaskFn<T> = Box::new(move |state| state.apply(task));
    DeferredFuture::from_state(State::deferred(task, None, None, Some(executor.clone())))
}

/// Stores a token-taking `task` in a deferred future bound to the
/// default executor.
pub fn schedule_stoppable<T, F>(task: F) -> StoppableDeferredFuture<T>
where
    T: Send + 'static,
    F: FnOnce(StopToken) -> T + Send + 'static,
{
    schedule_stoppable_on(&default_executor(), task)
}

/// Stores a token-taking `task` in a deferred future bound to
/// `executor`.
pub fn schedule_stoppable_on<T, F>(executor: &ExecutorHandle, task: F) -> StoppableDeferredFuture<T>
where
    T: Send + 'static,
    F: FnOnce(StopToken) -> T + Send + 'static,
{
    let source = StopSource::new();
    let token = source.token();
    let task: TaskFn<T> = Box::new(move |state| state.apply(move || task(token)));
    StoppableDeferredFuture::from_state(State::deferred(
        task,
        None,
        Some(source),
        Some(executor.clone()),
    ))
}

/// Returns a future that is already ready with `value`.
pub fn ready_future<T>(value: T) -> ReadyFuture<T>
where
    T: Send + 'static,
{
    ReadyFuture::from_state(State::ready(Ok(value)))
}

/// Returns a future that is already ready with `error`.
pub fn err_future<T>(error: Error) -> ReadyFuture<T>
where
    T: Send + 'static,
{
    ReadyFuture::from_state(State::ready(Err(error)))
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::time::Duration;

    use super::{ready_future, schedule, spawn, spawn_stoppable};
    use crate::error::{Error, WaitStatus};

    #[test]
    fn spawn_and_get() {
        let future = spawn(|| 42);
        assert_eq!(future.get(), Ok(42));
    }

    #[test]
    fn spawn_panicking_task() {
        let future = spawn(|| -> u32 { panic!("bad") });
        assert_eq!(future.get(), Err(Error::Panicked("bad".to_owned())));
    }

    #[test]
    fn schedule_runs_on_first_wait() {
        let future = schedule(|| 21 * 2);
        assert!(!future.is_ready());
        assert_eq!(future.get(), Ok(42));
    }

    #[test]
    fn stoppable_task_observes_request() {
        let future = spawn_stoppable(|token| {
            while !token.stop_requested() {
                std::thread::sleep(Duration::from_millis(1));
            }
            7
        });

        std::thread::sleep(Duration::from_millis(10));
        assert!(future.request_stop());
        assert_eq!(future.get(), Ok(7));
    }

    #[test]
    fn ready_future_is_ready() {
        let future = ready_future(5);
        assert!(future.is_ready());
        assert_eq!(future.wait_for(Duration::ZERO), Ok(WaitStatus::Ready));
        assert_eq!(future.get(), Ok(5));
    }
}
