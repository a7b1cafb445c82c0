//! Future handles.
//!
//! A handle is a view of one operation state. The six owned families
//! (see the aliases below) are instantiations of [`BasicFuture`] at the
//! six [option records]; [`SharedFuture`] is the shared variant produced
//! by [`BasicFuture::share`].
//!
//! A handle is *valid* while it holds a state. [`BasicFuture::get`]
//! consumes the handle and moves the result out; shared handles clone it
//! and are idempotent. Unless detached, a valid handle joins at drop: the
//! destructor blocks until the state is ready.
//!
//! [option records]: options::FutureOptions

pub mod options;

mod shared;

pub use shared::{
    SharedContinuableFuture, SharedDeferredFuture, SharedFuture, SharedPlainFuture,
    SharedReadyFuture, SharedStoppableDeferredFuture, SharedStoppableFuture,
};

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use executor::ExecutorHandle;
use futures_core::future::FusedFuture;

use crate::continuations::ContinuationList;
use crate::error::{Error, WaitStatus};
use crate::notify::NotifyCell;
use crate::state::{Observer, State};
use crate::stop::{StopSource, StopToken};

use options::{FutureOptions, HasStopSource};

/// Plain future: no continuation list, no stop source. Produced by
/// [`Promise`](crate::Promise) and used for interop.
pub type Future<T> = BasicFuture<T, options::Plain>;

/// Continuable future: the default return of [`spawn`](crate::spawn).
pub type ContinuableFuture<T> = BasicFuture<T, options::Continuable>;

/// Continuable future with a stop source. Returned when the task takes a
/// stop token.
pub type StoppableFuture<T> = BasicFuture<T, options::Stoppable>;

/// Deferred future: the task is stored and launched on first wait.
/// Returned by [`schedule`](crate::schedule).
pub type DeferredFuture<T> = BasicFuture<T, options::Deferred>;

/// Deferred future with a stop source.
pub type StoppableDeferredFuture<T> = BasicFuture<T, options::StoppableDeferred>;

/// Future that was born ready. Returned by
/// [`ready_future`](crate::ready_future).
pub type ReadyFuture<T> = BasicFuture<T, options::Value>;

/// Opaque handle to a `notify_when_ready` registration.
#[derive(Debug)]
pub struct ReadyNotification(u64);

/// An owned handle to an operation state.
pub struct BasicFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    state: Option<Arc<State<T>>>,
    join: bool,
    _options: PhantomData<fn() -> O>,
}

impl<T, O> BasicFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    pub(crate) fn from_state(state: Arc<State<T>>) -> Self {
        Self {
            state: Some(state),
            join: true,
            _options: PhantomData,
        }
    }

    pub(crate) fn state(&self) -> Option<&Arc<State<T>>> {
        self.state.as_ref()
    }

    /// Returns `true` if this handle holds a state.
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// Returns `true` if the state is ready. Invalid handles report
    /// `false`.
    pub fn is_ready(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_ready())
    }

    /// Blocks until the state is ready.
    pub fn wait(&self) -> Result<(), Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        state.wait();
        Ok(())
    }

    /// Blocks until the state is ready or `timeout` elapses.
    pub fn wait_for(&self, timeout: Duration) -> Result<WaitStatus, Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        Ok(state.wait_timeout(timeout))
    }

    /// Blocks until the state is ready or `deadline` is reached.
    pub fn wait_until(&self, deadline: Instant) -> Result<WaitStatus, Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        Ok(state.wait_until(deadline))
    }

    /// Waits for the result and moves it out, consuming the handle.
    pub fn get(mut self) -> Result<T, Error> {
        let state = self.state.take().ok_or(Error::NoState)?;
        state.take_outcome()
    }

    /// Returns the stored error of a ready, failed state.
    pub fn get_error(&self) -> Option<Error> {
        self.state.as_ref().and_then(|state| state.peek_error())
    }

    /// Suppresses the join at destruction.
    pub fn detach(&mut self) {
        self.join = false;
    }

    /// Converts this handle into a shared one.
    pub fn share(mut self) -> SharedFuture<T, O> {
        SharedFuture::from_state(self.state.take())
    }

    /// Returns an address-stable observer of the state.
    pub fn observer(&self) -> Option<Observer> {
        self.state.as_ref().map(|s| Observer::from_state(s.clone()))
    }

    /// Registers `cell` to be latched when the state becomes ready.
    ///
    /// Registration on a ready state latches the cell immediately. The
    /// returned handle can be passed to [`unnotify_when_ready`].
    ///
    /// [`unnotify_when_ready`]: Self::unnotify_when_ready
    pub fn notify_when_ready(&self, cell: &Arc<NotifyCell>) -> Result<ReadyNotification, Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        Ok(ReadyNotification(state.notify_when_ready(cell.clone())))
    }

    /// Removes a registration made with [`notify_when_ready`].
    ///
    /// [`notify_when_ready`]: Self::notify_when_ready
    pub fn unnotify_when_ready(&self, handle: ReadyNotification) -> Result<(), Error> {
        let state = self.state.as_ref().ok_or(Error::NoState)?;
        state.unnotify_when_ready(handle.0);
        Ok(())
    }
}

impl<T, O> BasicFuture<T, O>
where
    T: Send + 'static,
    O: HasStopSource,
{
    /// Requests the task to stop. Returns `true` iff this call was the
    /// transition.
    pub fn request_stop(&self) -> bool {
        self.state
            .as_ref()
            .and_then(|state| state.stop_source())
            .is_some_and(|source| source.request_stop())
    }

    /// Returns a copy of the stop source.
    pub fn stop_source(&self) -> Option<StopSource> {
        self.state
            .as_ref()
            .and_then(|state| state.stop_source())
            .cloned()
    }

    /// Returns a token observing the stop source.
    pub fn stop_token(&self) -> Option<StopToken> {
        self.state
            .as_ref()
            .and_then(|state| state.stop_source())
            .map(|source| source.token())
    }
}

impl<T, O> Drop for BasicFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    fn drop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        // A unique stoppable future going out of scope cancels its task
        // before joining, like a joining thread handle would.
        if O::STOPPABLE && !state.is_ready() {
            if let Some(source) = state.stop_source() {
                source.request_stop();
            }
        }

        if self.join && !state.is_ready() {
            state.wait();
        }
    }
}

impl<T, O> std::fmt::Debug for BasicFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicFuture")
            .field("valid", &self.state.is_some())
            .finish_non_exhaustive()
    }
}

impl<T, O> std::future::Future for BasicFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(state) = this.state.as_ref() else {
            return Poll::Ready(Err(Error::NoState));
        };

        if O::DEFERRED {
            state.poll_launch();
        }

        state.register_waker(cx.waker());
        if state.is_ready() {
            let state = match this.state.take() {
                Some(state) => state,
                None => return Poll::Ready(Err(Error::NoState)),
            };
            Poll::Ready(state.take_outcome())
        } else {
            Poll::Pending
        }
    }
}

impl<T, O> FusedFuture for BasicFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    fn is_terminated(&self) -> bool {
        self.state.is_none()
    }
}

/// Uniform view of a future handle, as seen by adaptors.
///
/// Every owned family, every shared family and both combinator proxies
/// implement this; it is what lets a wait-any hold leaves of varying
/// capability.
pub trait FutureHandle: Send + Sized + 'static {
    type Output: Send + 'static;

    fn valid(&self) -> bool;

    fn is_ready(&self) -> bool;

    fn wait(&self) -> Result<(), Error>;

    fn wait_for(&self, timeout: Duration) -> Result<WaitStatus, Error>;

    /// Waits, then extracts the output.
    fn into_output(self) -> Result<Self::Output, Error>;

    /// Address-stable observer of the underlying state, if there is a
    /// single one. Proxies have none and are polled instead.
    fn observer(&self) -> Option<Observer> {
        None
    }

    /// `true` if continuations attach lazily (without polling).
    fn lazy_continuable(&self) -> bool {
        false
    }

    /// The continuation list of a lazily continuable handle.
    fn continuation_list(&self) -> Option<Arc<ContinuationList>> {
        None
    }

    /// The executor stored in the state, if any.
    fn stored_executor(&self) -> Option<ExecutorHandle> {
        None
    }
}

impl<T, O> FutureHandle for BasicFuture<T, O>
where
    T: Send + 'static,
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
