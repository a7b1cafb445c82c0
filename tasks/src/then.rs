//! Continuation attachment.
//!
//! [`then`] produces a new future whose state becomes ready after the
//! continuation was applied to the parent's result. How the parent's
//! result is delivered to the continuation is decided by an unwrapping
//! rule; the rules are the impls of [`Continuation`], selected through
//! the marker parameter `M` by type inference. When more than one rule
//! could apply, `M` fails to infer and the program does not compile.
//!
//! | Marker          | Parent output        | Continuation shape              |
//! |-----------------|----------------------|---------------------------------|
//! | `Nullary`       | `()`                 | `FnOnce() -> R`                 |
//! | `Value`         | `T`                  | `FnOnce(T) -> R`                |
//! | `Unwrap`        | future of `U`        | `FnOnce(U) -> R`                |
//! | `UnwrapAll`     | tuple of futures     | `FnOnce(U0, …, Un) -> R`        |
//! | `UnwrapVec`     | `Vec` of futures     | `FnOnce(Vec<U>) -> R`           |
//! | `SelectSplit`   | wait-any result      | `FnOnce(Option<usize>, S) -> R` |
//! | `SelectExplode` | wait-any over tuple  | `FnOnce(Option<usize>, F0, …) -> R` |
//! | `SelectFuture`  | wait-any over `Vec`  | `FnOnce(F) -> R`                |
//! | `SelectValue`   | wait-any over `Vec`  | `FnOnce(U) -> R`                |
//!
//! Tuple destructuring in closure patterns covers the tuple-explode rule
//! of the `Value` row; by-value delivery covers what reference-qualified
//! languages split into separate rules.
//!
//! Attachment strategy: a continuable parent gets a trampoline emplaced
//! into its continuation list which posts the continuation job to the
//! executor; a non-continuable parent gets a polling wrapper deferred on
//! the executor that waits on the parent. A deferred parent chains
//! through the child's stored task instead. A parent that is already
//! ready always dispatches through the executor, never inline.
//!
//! [`then`]: BasicFuture::then

use std::ops::{Rem, Shr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use executor::{default_executor, ExecutorHandle};

use crate::adaptor::WaitAnyResult;
use crate::continuations::ContinuationList;
use crate::error::Error;
use crate::future::options::FutureOptions;
use crate::future::{BasicFuture, ContinuableFuture, FutureHandle, SharedFuture, StoppableFuture};
use crate::state::{Observer, ProducerGuard, State, TaskFn};
use crate::stop::{StopSource, StopToken};

/// Unwrapping-rule markers. See the [module docs](self) for the table.
///
/// `UnwrapAll` and `SelectExplode` carry the leaf tuple as a parameter:
/// one rule instance per arity, which is also what keeps their
/// per-arity impls coherent.
pub mod markers {
    use std::marker::PhantomData;

    #[derive(Debug)]
    pub struct Nullary;
    #[derive(Debug)]
    pub struct Value;
    #[derive(Debug)]
    pub struct Unwrap;
    #[derive(Debug)]
    pub struct UnwrapAll<S>(PhantomData<S>);
    #[derive(Debug)]
    pub struct UnwrapVec;
    #[derive(Debug)]
    pub struct SelectSplit;
    #[derive(Debug)]
    pub struct SelectExplode<S>(PhantomData<S>);
    #[derive(Debug)]
    pub struct SelectFuture;
    #[derive(Debug)]
    pub struct SelectValue;
}

/// A continuation applicable to a parent future of type `P`.
///
/// `M` is the unwrapping rule; it is inferred, never named in user code.
pub trait Continuation<P, M>: Send + 'static
where
    P: FutureHandle,
{
    type Output: Send + 'static;

    /// Extracts the parent's result and applies the continuation.
    ///
    /// A parent error short-circuits and becomes the child's error.
    fn continue_with(self, parent: P) -> Result<Self::Output, Error>;
}

/// A continuation that additionally receives a stop token.
pub trait StopContinuation<P, M>: Send + 'static
where
    P: FutureHandle,
{
    type Output: Send + 'static;

    fn continue_with(self, parent: P, token: StopToken) -> Result<Self::Output, Error>;
}

impl<P, F, R> Continuation<P, markers::Value> for F
where
    P: FutureHandle,
    F: FnOnce(P::Output) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P) -> Result<R, Error> {
        Ok(self(parent.into_output()?))
    }
}

impl<P, F, R> Continuation<P, markers::Nullary> for F
where
    P: FutureHandle<Output = ()>,
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P) -> Result<R, Error> {
        parent.into_output()?;
        Ok(self())
    }
}

impl<P, Q, F, R> Continuation<P, markers::Unwrap> for F
where
    P: FutureHandle<Output = Q>,
    Q: FutureHandle,
    F: FnOnce(Q::Output) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P) -> Result<R, Error> {
        let inner = parent.into_output()?;
        Ok(self(inner.into_output()?))
    }
}

impl<P, Q, F, R> Continuation<P, markers::UnwrapVec> for F
where
    P: FutureHandle<Output = Vec<Q>>,
    Q: FutureHandle,
    F: FnOnce(Vec<Q::Output>) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P) -> Result<R, Error> {
        let futures = parent.into_output()?;
        let mut values = Vec::with_capacity(futures.len());
        for future in futures {
            values.push(future.into_output()?);
        }
        Ok(self(values))
    }
}

macro_rules! impl_unwrap_all {
    ($(($G:ident, $g:ident)),+) => {
        impl<P, F, R, $($G),+> Continuation<P, markers::UnwrapAll<($($G,)+)>> for F
        where
            P: FutureHandle<Output = ($($G,)+)>,
            $($G: FutureHandle,)+
            F: FnOnce($($G::Output),+) -> R + Send + 'static,
            R: Send + 'static,
        {
            type Output = R;

            fn continue_with(self, parent: P) -> Result<R, Error> {
                let ($($g,)+) = parent.into_output()?;
                Ok(self($($g.into_output()?),+))
            }
        }
    };
}

impl_unwrap_all!((G0, g0));
impl_unwrap_all!((G0, g0), (G1, g1));
impl_unwrap_all!((G0, g0), (G1, g1), (G2, g2));
impl_unwrap_all!((G0, g0), (G1, g1), (G2, g2), (G3, g3));
impl_unwrap_all!((G0, g0), (G1, g1), (G2, g2), (G3, g3), (G4, g4));
impl_unwrap_all!((G0, g0), (G1, g1), (G2, g2), (G3, g3), (G4, g4), (G5, g5));
impl_unwrap_all!(
    (G0, g0),
    (G1, g1),
    (G2, g2),
    (G3, g3),
    (G4, g4),
    (G5, g5),
    (G6, g6)
);
impl_unwrap_all!(
    (G0, g0),
    (G1, g1),
    (G2, g2),
    (G3, g3),
    (G4, g4),
    (G5, g5),
    (G6, g6),
    (G7, g7)
);

impl<P, S, F, R> Continuation<P, markers::SelectSplit> for F
where
    P: FutureHandle<Output = WaitAnyResult<S>>,
    S: Send + 'static,
    F: FnOnce(Option<usize>, S) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P) -> Result<R, Error> {
        let result = parent.into_output()?;
        Ok(self(result.index, result.tasks))
    }
}

macro_rules! impl_select_explode {
    ($(($G:ident, $g:ident)),+) => {
        impl<P, F, R, $($G),+> Continuation<P, markers::SelectExplode<($($G,)+)>> for F
        where
            P: FutureHandle<Output = WaitAnyResult<($($G,)+)>>,
            $($G: Send + 'static,)+
            F: FnOnce(Option<usize>, $($G),+) -> R + Send + 'static,
            R: Send + 'static,
        {
            type Output = R;

            fn continue_with(self, parent: P) -> Result<R, Error> {
                let result = parent.into_output()?;
                let ($($g,)+) = result.tasks;
                Ok(self(result.index, $($g),+))
            }
        }
    };
}

impl_select_explode!((G0, g0));
impl_select_explode!((G0, g0), (G1, g1));
impl_select_explode!((G0, g0), (G1, g1), (G2, g2));
impl_select_explode!((G0, g0), (G1, g1), (G2, g2), (G3, g3));
impl_select_explode!((G0, g0), (G1, g1), (G2, g2), (G3, g3), (G4, g4));
impl_select_explode!((G0, g0), (G1, g1), (G2, g2), (G3, g3), (G4, g4), (G5, g5));
impl_select_explode!(
    (G0, g0),
    (G1, g1),
    (G2, g2),
    (G3, g3),
    (G4, g4),
    (G5, g5),
    (G6, g6)
);
impl_select_explode!(
    (G0, g0),
    (G1, g1),
    (G2, g2),
    (G3, g3),
    (G4, g4),
    (G5, g5),
    (G6, g6),
    (G7, g7)
);

impl<P, Q, F, R> Continuation<P, markers::SelectFuture> for F
where
    P: FutureHandle<Output = WaitAnyResult<Vec<Q>>>,
    Q: FutureHandle,
    F: FnOnce(Q) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P) -> Result<R, Error> {
        let result = parent.into_output()?;
        let index = result.index.ok_or(Error::NoState)?;
        let mut tasks = result.tasks;
        Ok(self(tasks.swap_remove(index)))
    }
}

impl<P, Q, F, R> Continuation<P, markers::SelectValue> for F
where
    P: FutureHandle<Output = WaitAnyResult<Vec<Q>>>,
    Q: FutureHandle,
    F: FnOnce(Q::Output) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P) -> Result<R, Error> {
        let result = parent.into_output()?;
        let index = result.index.ok_or(Error::NoState)?;
        let mut tasks = result.tasks;
        Ok(self(tasks.swap_remove(index).into_output()?))
    }
}

impl<P, F, R> StopContinuation<P, markers::Value> for F
where
    P: FutureHandle,
    F: FnOnce(StopToken, P::Output) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P, token: StopToken) -> Result<R, Error> {
        Ok(self(token, parent.into_output()?))
    }
}

impl<P, F, R> StopContinuation<P, markers::Nullary> for F
where
    P: FutureHandle<Output = ()>,
    F: FnOnce(StopToken) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P, token: StopToken) -> Result<R, Error> {
        parent.into_output()?;
        Ok(self(token))
    }
}

impl<P, Q, F, R> StopContinuation<P, markers::Unwrap> for F
where
    P: FutureHandle<Output = Q>,
    Q: FutureHandle,
    F: FnOnce(StopToken, Q::Output) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P, token: StopToken) -> Result<R, Error> {
        let inner = parent.into_output()?;
        Ok(self(token, inner.into_output()?))
    }
}

impl<P, Q, F, R> StopContinuation<P, markers::UnwrapVec> for F
where
    P: FutureHandle<Output = Vec<Q>>,
    Q: FutureHandle,
    F: FnOnce(StopToken, Vec<Q::Output>) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn continue_with(self, parent: P, token: StopToken) -> Result<R, Error> {
        let futures = parent.into_output()?;
        let mut values = Vec::with_capacity(futures.len());
        for future in futures {
            values.push(future.into_output()?);
        }
        Ok(self(token, values))
    }
}

macro_rules! impl_stop_unwrap_all {
    ($(($G:ident, $g:ident)),+) => {
        impl<P, F, R, $($G),+> StopContinuation<P, markers::UnwrapAll<($($G,)+)>> for F
        where
            P: FutureHandle<Output = ($($G,)+)>,
            $($G: FutureHandle,)+
            F: FnOnce(StopToken, $($G::Output),+) -> R + Send + 'static,
            R: Send + 'static,
        {
            type Output = R;

            fn continue_with(self, parent: P, token: StopToken) -> Result<R, Error> {
                let ($($g,)+) = parent.into_output()?;
                Ok(self(token, $($g.into_output()?),+))
            }
        }
    };
}

impl_stop_unwrap_all!((G0, g0));
impl_stop_unwrap_all!((G0, g0), (G1, g1));
impl_stop_unwrap_all!((G0, g0), (G1, g1), (G2, g2));
impl_stop_unwrap_all!((G0, g0), (G1, g1), (G2, g2), (G3, g3));
impl_stop_unwrap_all!((G0, g0), (G1, g1), (G2, g2), (G3, g3), (G4, g4));
impl_stop_unwrap_all!((G0, g0), (G1, g1), (G2, g2), (G3, g3), (G4, g4), (G5, g5));
impl_stop_unwrap_all!(
    (G0, g0),
    (G1, g1),
    (G2, g2),
    (G3, g3),
    (G4, g4),
    (G5, g5),
    (G6, g6)
);
impl_stop_unwrap_all!(
    (G0, g0),
    (G1, g1),
    (G2, g2),
    (G3, g3),
    (G4, g4),
    (G5, g5),
    (G6, g6),
    (G7, g7)
);

type Runner<R> = Box<dyn FnOnce() -> Result<R, Error> + Send + 'static>;

/// Builds the child state and schedules the continuation job.
///
/// With a continuation list from the parent the job is attached lazily;
/// without one a polling wrapper is deferred on the executor. Either way
/// the job is the producer of the child state: a panic is captured and
/// an executor dropping the job breaks the child promise.
pub(crate) fn attach_eager<R, CO>(
    lazy: Option<Arc<ContinuationList>>,
    executor: ExecutorHandle,
    child_stop: Option<StopSource>,
    runner: Runner<R>,
) -> BasicFuture<R, CO>
where
    R: Send + 'static,
    CO: FutureOptions,
{
    let state = State::eager(CO::CONTINUABLE, child_stop, Some(executor.clone()));

    let job_state = state.clone();
    let guard = ProducerGuard::new(state.clone());
    let job: executor::Job = Box::new(move || {
        let outcome = match catch_unwind(AssertUnwindSafe(runner)) {
            Ok(result) => result,
            Err(payload) => Err(Error::from_panic(payload)),
        };
        let _ = job_state.set_outcome(outcome);
        guard.disarm();
    });

    match lazy {
        Some(list) => {
            // The trampoline in the parent's list only posts; the
            // continuation itself always runs on the executor.
            let post_to = executor.clone();
            list.emplace(&executor, Box::new(move || post_to.post(job)));
        }
        None => executor.defer(job),
    }

    BasicFuture::from_state(state)
}

/// Builds a deferred child whose stored task runs the continuation.
///
/// The parent observer is waited on before the task is posted.
pub(crate) fn attach_deferred<R, CO>(
    parent: Option<Observer>,
    executor: ExecutorHandle,
    child_stop: Option<StopSource>,
    runner: Runner<R>,
) -> BasicFuture<R, CO>
where
    R: Send + 'static,
    CO: FutureOptions,
{
    let task: TaskFn<R> = Box::new(move |state| {
        let outcome = match catch_unwind(AssertUnwindSafe(runner)) {
            Ok(result) => result,
            Err(payload) => Err(Error::from_panic(payload)),
        };
        let _ = state.set_outcome(outcome);
    });

    BasicFuture::from_state(State::deferred(task, parent, child_stop, Some(executor)))
}

impl<T, O> BasicFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    /// Attaches `f` to run after this future, on this future's executor
    /// (or the default executor if none is stored).
    pub fn then<F, M>(self, f: F) -> BasicFuture<F::Output, O::ThenChild>
    where
        F: Continuation<Self, M>,
    {
        let executor = self
            .state()
            .and_then(|s| s.executor().cloned())
            .unwrap_or_else(default_executor);
        self.then_on(&executor, f)
    }

    /// Attaches `f` to run after this future, on `executor`.
    pub fn then_on<F, M>(self, executor: &ExecutorHandle, f: F) -> BasicFuture<F::Output, O::ThenChild>
    where
        F: Continuation<Self, M>,
    {
        if !self.valid() {
            return BasicFuture::from_state(State::ready(Err(Error::NoState)));
        }

        let child_stop = if O::STOPPABLE {
            self.state().and_then(|s| s.stop_source().cloned())
        } else {
            None
        };

        if O::DEFERRED {
            let parent = self.observer();
            let runner: Runner<F::Output> = Box::new(move || f.continue_with(self));
            attach_deferred(parent, executor.clone(), child_stop, runner)
        } else {
            let lazy = self.continuation_list();
            let runner: Runner<F::Output> = Box::new(move || f.continue_with(self));
            attach_eager(lazy, executor.clone(), child_stop, runner)
        }
    }

    /// Attaches a token-taking `f` with a fresh stop source.
    pub fn then_stop<F, M>(self, f: F) -> BasicFuture<F::Output, O::ThenStopChild>
    where
        F: StopContinuation<Self, M>,
    {
        let executor = self
            .state()
            .and_then(|s| s.executor().cloned())
            .unwrap_or_else(default_executor);
        self.then_stop_on(&executor, f)
    }

    /// Attaches a token-taking `f` with a fresh stop source, on
    /// `executor`.
    pub fn then_stop_on<F, M>(
        self,
        executor: &ExecutorHandle,
        f: F,
    ) -> BasicFuture<F::Output, O::ThenStopChild>
    where
        F: StopContinuation<Self, M>,
    {
        if !self.valid() {
            return BasicFuture::from_state(State::ready(Err(Error::NoState)));
        }

        let source = StopSource::new();
        let token = source.token();

        if O::DEFERRED {
            let parent = self.observer();
            let runner: Runner<F::Output> = Box::new(move || f.continue_with(self, token));
            attach_deferred(parent, executor.clone(), Some(source), runner)
        } else {
            let lazy = self.continuation_list();
            let runner: Runner<F::Output> = Box::new(move || f.continue_with(self, token));
            attach_eager(lazy, executor.clone(), Some(source), runner)
        }
    }
}

impl<T, O> SharedFuture<T, O>
where
    T: Clone + Send + 'static,
    O: FutureOptions,
{
    /// Attaches `f` to run after this future.
    ///
    /// Children of shared parents never share the parent's stop source;
    /// the child is a plain continuable future.
    pub fn then<F, M>(self, f: F) -> ContinuableFuture<F::Output>
    where
        F: Continuation<Self, M>,
    {
        let executor = self
            .state()
            .and_then(|s| s.executor().cloned())
            .unwrap_or_else(default_executor);
        self.then_on(&executor, f)
    }

    /// Attaches `f` to run after this future, on `executor`.
    pub fn then_on<F, M>(self, executor: &ExecutorHandle, f: F) -> ContinuableFuture<F::Output>
    where
        F: Continuation<Self, M>,
    {
        then_via(self, executor.clone(), f)
    }

    /// Attaches a token-taking `f` with a fresh stop source.
    pub fn then_stop<F, M>(self, f: F) -> StoppableFuture<F::Output>
    where
        F: StopContinuation<Self, M>,
    {
        let executor = self
            .state()
            .and_then(|s| s.executor().cloned())
            .unwrap_or_else(default_executor);
        then_stop_via(self, executor, f)
    }
}

/// Generic continuation attachment for parents without an option record
/// (shared futures, combinator proxies).
pub(crate) fn then_via<P, F, M>(parent: P, executor: ExecutorHandle, f: F) -> ContinuableFuture<F::Output>
where
    P: FutureHandle,
    F: Continuation<P, M>,
{
    if !parent.valid() {
        return BasicFuture::from_state(State::ready(Err(Error::NoState)));
    }
    let lazy = parent.continuation_list();
    let runner: Runner<F::Output> = Box::new(move || f.continue_with(parent));
    attach_eager(lazy, executor, None, runner)
}

/// Like [`then_via`], for token-taking continuations.
pub(crate) fn then_stop_via<P, F, M>(
    parent: P,
    executor: ExecutorHandle,
    f: F,
) -> StoppableFuture<F::Output>
where
    P: FutureHandle,
    F: StopContinuation<P, M>,
{
    if !parent.valid() {
        return BasicFuture::from_state(State::ready(Err(Error::NoState)));
    }
    let source = StopSource::new();
    let token = source.token();
    let lazy = parent.continuation_list();
    let runner: Runner<F::Output> = Box::new(move || f.continue_with(parent, token));
    attach_eager(lazy, executor, Some(source), runner)
}

/// A future bound to an executor by `future % executor`.
///
/// `%` binds tighter than `>>`, so `future % ex >> f` runs `f` on `ex`:
/// the executor binding is applied before the continuation binding.
pub struct Bound<P> {
    parent: P,
    executor: ExecutorHandle,
}

impl<P: std::fmt::Debug> std::fmt::Debug for Bound<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bound")
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl<P> Bound<P> {
    pub(crate) fn new(parent: P, executor: ExecutorHandle) -> Self {
        Self { parent, executor }
    }

    pub(crate) fn into_parts(self) -> (P, ExecutorHandle) {
        (self.parent, self.executor)
    }
}

impl<T, O> Rem<&ExecutorHandle> for BasicFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
{
    type Output = Bound<Self>;

    fn rem(self, executor: &ExecutorHandle) -> Bound<Self> {
        Bound {
            parent: self,
            executor: executor.clone(),
        }
    }
}

/// `future >> f` is `future.then(f)` for value continuations.
impl<T, O, F, R> Shr<F> for BasicFuture<T, O>
where
    T: Send + 'static,
    O: FutureOptions,
    F: FnOnce(T) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = BasicFuture<R, O::ThenChild>;

    fn shr(self, f: F) -> Self::Output {
        self.then(f)
    }
}

/// `future % ex >> f` is `future.then_on(&ex, f)`.
impl<T, O, F, R> Shr<F> for Bound<BasicFuture<T, O>>
where
    T: Send + 'static,
    O: FutureOptions,
    F: FnOnce(T) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = BasicFuture<R, O::ThenChild>;

    fn shr(self, f: F) -> Self::Output {
        self.parent.then_on(&self.executor, f)
    }
}
