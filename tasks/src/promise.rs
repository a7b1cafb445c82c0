//! Producer handles: [`Promise`] and [`PackagedTask`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::Error;
use crate::future::Future;
use crate::state::State;

/// The producer half of a plain future.
///
/// A promise delivers exactly one value or error to its state. Dropping
/// a promise that has delivered nothing stores the broken-promise error
/// instead, so consumers are never left blocked.
#[derive(Debug)]
pub struct Promise<T>
where
    T: Send + 'static,
{
    state: Arc<State<T>>,
    retrieved: bool,
}

impl<T> Promise<T>
where
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            state: State::eager(false, None, None),
            retrieved: false,
        }
    }

    /// Returns the future observing this promise.
    ///
    /// May be called once; a second call returns `AlreadyRetrieved`.
    pub fn future(&mut self) -> Result<Future<T>, Error> {
        if self.retrieved {
            return Err(Error::AlreadyRetrieved);
        }
        self.retrieved = true;
        Ok(Future::from_state(self.state.clone()))
    }

    /// Delivers the value.
    pub fn set_value(&mut self, value: T) -> Result<(), Error> {
        self.state.set_outcome(Ok(value))
    }

    /// Delivers an error.
    pub fn set_error(&mut self, error: Error) -> Result<(), Error> {
        self.state.set_outcome(Err(error))
    }
}

impl<T> Default for Promise<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T>
where
    T: Send + 'static,
{
    fn drop(&mut self) {
        self.state.set_broken();
    }
}

/// A task bundled with the state it will fulfill.
///
/// The task runs when [`run`] is called, at most once; a panic inside the
/// task is captured into the state. Dropping a packaged task that never
/// ran breaks the promise.
///
/// [`run`]: Self::run
pub struct PackagedTask<T>
where
    T: Send + 'static,
{
    task: Option<Box<dyn FnOnce() -> T + Send + 'static>>,
    state: Arc<State<T>>,
    retrieved: bool,
}

impl<T> PackagedTask<T>
where
    T: Send + 'static,
{
    pub fn new<F>(task: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            task: Some(Box::new(task)),
            state: State::eager(false, None, None),
            retrieved: false,
        }
    }

    /// Returns the future observing this task.
    ///
    /// May be called once; a second call returns `AlreadyRetrieved`.
    pub fn future(&mut self) -> Result<Future<T>, Error> {
        if self.retrieved {
            return Err(Error::AlreadyRetrieved);
        }
        self.retrieved = true;
        Ok(Future::from_state(self.state.clone()))
    }

    /// Runs the task and delivers its result.
    ///
    /// A second call returns `AlreadySatisfied`.
    pub fn run(&mut self) -> Result<(), Error> {
        let task = self.task.take().ok_or(Error::AlreadySatisfied)?;
        let outcome = match catch_unwind(AssertUnwindSafe(task)) {
            Ok(value) => Ok(value),
            Err(payload) => Err(Error::from_panic(payload)),
        };
        self.state.set_outcome(outcome)
    }
}

impl<T> Drop for PackagedTask<T>
where
    T: Send + 'static,
{
    fn drop(&mut self) {
        self.state.set_broken();
    }
}

impl<T> std::fmt::Debug for PackagedTask<T>
where
    T: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagedTask")
            .field("run", &self.task.is_none())
            .finish_non_exhaustive()
    }
}
