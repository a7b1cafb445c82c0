//! Shared future handles.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use executor::ExecutorHandle;

use crate::continuations::ContinuationList;
use crate::error::{Error, WaitStatus};
use crate::notify::NotifyCell;
use crate::state::{Observer, State};
use crate::stop::{StopSource, StopToken};

use super::options::{self, FutureOptions, HasStopSource};
use super::{FutureHandle, ReadyNotification};

/// Shared variant of [`Future`](super::Future).
pub type SharedPlainFuture<T> = SharedFuture<T, options::Plain>;

/// Shared variant of [`ReadyFuture`](super::ReadyFuture).
pub type SharedReadyFuture<T> = SharedFuture<T, options::Value>;

/// Shared variant of [`ContinuableFuture`](super::ContinuableFuture).
pub type SharedContinuableFuture<T> = SharedFuture<T, options::Continuable>;

/// Shared variant of [`StoppableFuture`](super::StoppableFuture).
pub type SharedStoppableFuture<T> = SharedFuture<T, options::Stoppable>;

/// Shared variant of [`DeferredFuture`](super::DeferredFuture).
pub type SharedDeferredFuture<T> = SharedFuture<T, options::Deferred>;

/// Shared variant of
/// [`StoppableDeferredFuture`](super::StoppableDeferredFuture).
pub type SharedStoppableDeferredFuture<T> = SharedFuture<T, options::StoppableDeferred>;

/// A cloneable handle observing an operation state.
///
/// Any number of shared handles may observe the same state; `get` clones
/// the result and is idempotent. Only the last handle joins at drop.
pub struct SharedFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    state: Option<Arc<State<T>>>,
    join: bool,
    _options: PhantomData<fn() -> O>,
}

impl<T, O> SharedFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    pub(crate) fn from_state(state: Option<Arc<State<T>>>) -> Self {
        Self {
            join: state.is_some(),
            state,
            _options: PhantomData,
        }
    }

    pub(crate) fn state(&self) -> Option<&Arc<State<T>>> {
        self.state.as_ref()
    }

    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_ready())
    }

    pub fn wait(&self) -> Result<(), Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        state.wait();
        Ok(())
    }

    pub fn wait_for(&self, timeout: Duration) -> Result<WaitStatus, Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        Ok(state.wait_timeout(timeout))
    }

    pub fn wait_until(&self, deadline: Instant) -> Result<WaitStatus, Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        Ok(state.wait_until(deadline))
    }

    /// Waits for the result and returns a clone of it.
    ///
    /// Unlike [`BasicFuture::get`](super::BasicFuture::get) this does not
    /// consume the handle and may be called repeatedly.
    pub fn get(&self) -> Result<T, Error>
    where
        T: Clone,
    {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        state.clone_outcome()
    }

    pub fn get_error(&self) -> Option<Error> {
        self.state.as_ref().and_then(|state| state.peek_error())
    }

    pub fn detach(&mut self) {
        self.join = false;
    }

    pub fn observer(&self) -> Option<Observer> {
        self.state.as_ref().map(|s| Observer::from_state(s.clone()))
    }

    pub fn notify_when_ready(&self, cell: &Arc<NotifyCell>) -> Result<ReadyNotification, Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        Ok(ReadyNotification(state.notify_when_ready(cell.clone())))
    }

    pub fn unnotify_when_ready(&self, handle: ReadyNotification) -> Result<(), Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        state.unnotify_when_ready(handle.0);
        Ok(())
    }
}

impl<T, O> SharedFuture<T, O>
where
    T: Send + 'static,
    O: HasStopSource,
{
    /// Requests the task to stop. Any holder of a shared future may
    /// cancel; all other holders observe the result.
    pub fn request_stop(&self) -> bool {
        self.state
            .as_ref()
            .and_then(|state| state.stop_source())
            .is_some_and(|source| source.request_stop())
    }

    pub fn stop_source(&self) -> Option<StopSource> {
        self.state
            .as_ref()
            .and_then(|state| state.stop_source())
            .cloned()
    }

    pub fn stop_token(&self) -> Option<StopToken> {
        self.state
            .as_ref()
            .and_then(|state| state.stop_source())
            .map(|source| source.token())
    }
}

impl<T, O> Clone for SharedFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            join: self.state.is_some(),
            _options: PhantomData,
        }
    }
}

impl<T, O> Drop for SharedFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    fn drop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        // Only the last reference joins. The count also includes
        // references held by pending continuations and observers; those
        // keep the state alive on their own, so not joining then is fine.
        if self.join && Arc::strong_count(&state) == 1 && !state.is_ready() {
            state.wait();
        }
    }
}

impl<T, O> std::fmt::Debug for SharedFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFuture")
            .field("valid", &self.state.is_some())
            .finish_non_exhaustive()
    }
}

impl<T, O> FutureHandle for SharedFuture<T, O>
where
    T: Clone + Send + 'static,
    O: FutureOptions,
{
    type Output = T;

    fn valid(&self) -> bool {
        Self::valid(self)
    }

    fn is_ready(&self) -> bool {
        Self::is_ready(self)
    }

    fn wait(&self) -> Result<(), Error> {
        Self::wait(self)
    }

    fn wait_for(&self, timeout: Duration) -> Result<WaitStatus, Error> {
        Self::wait_for(self, timeout)
    }

    fn into_output(self) -> Result<T, Error> {
        self.get()
    }

    fn observer(&self) -> Option<Observer> {
        Self::observer(self)
    }

    fn lazy_continuable(&self) -> bool {
        O::CONTINUABLE
    }

    fn continuation_list(&self) -> Option<Arc<ContinuationList>> {
        if O::CONTINUABLE {
            self.state.as_ref().and_then(|s| s.continuations_arc())
        } else {
            None
        }
    }

    fn stored_executor(&self) -> Option<ExecutorHandle> {
        self.state.as_ref().and_then(|s| s.executor().cloned())
    }
}
