//! The wait-all combinator.
//!
//! A conjunction proxy over a sequence of futures. Waiting is the
//! degenerate case: sleep on each leaf in turn, since every leaf is
//! needed anyway. `get` returns the leaf sequence itself; the unwrapping
//! rules of [`then`](WaitAllFuture::then) extract the values.

use std::ops::{BitAnd, Rem, Shr};
use std::time::{Duration, Instant};

use executor::{default_executor, ExecutorHandle};

use crate::error::{Error, WaitStatus};
use crate::future::options::FutureOptions;
use crate::future::{BasicFuture, ContinuableFuture, FutureHandle, SharedFuture, StoppableFuture};
use crate::then::{then_stop_via, then_via, Bound, Continuation, StopContinuation};

use super::seq::FutureSequence;
use super::when_any::WaitAnyFuture;

/// Creates a conjunction over `seq` (a tuple of futures, arity ≤ 8).
///
/// The proxy is ready once every leaf is ready; an empty sequence is
/// immediately ready.
pub fn when_all<S>(seq: S) -> WaitAllFuture<S>
where
    S: FutureSequence,
{
    WaitAllFuture { seq: Some(seq) }
}

/// Creates a conjunction over a dynamic collection of futures.
pub fn when_all_iter<F, I>(futures: I) -> WaitAllFuture<Vec<F>>
where
    F: FutureHandle,
    I: IntoIterator<Item = F>,
{
    when_all(futures.into_iter().collect())
}

/// Proxy future over a conjunction of futures.
#[derive(Debug)]
pub struct WaitAllFuture<S>
where
    S: FutureSequence,
{
    seq: Option<S>,
}

impl<S> WaitAllFuture<S>
where
    S: FutureSequence,
{
    pub(crate) fn invalid() -> Self {
        Self { seq: None }
    }

    /// `true` while the proxy holds its sequence and the sequence is
    /// empty or holds at least one valid leaf.
    pub fn valid(&self) -> bool {
        self.seq
            .as_ref()
            .is_some_and(|seq| seq.is_empty() || seq.any_valid())
    }

    /// `true` once every leaf is ready.
    pub fn is_ready(&self) -> bool {
        self.seq
            .as_ref()
            .is_some_and(|seq| (0..seq.len()).all(|index| seq.is_ready_at(index)))
    }

    /// Blocks until every leaf is ready.
    pub fn wait(&self) -> Result<(), Error> {
        let seq = self.seq.as_ref().ok_or(Error::NoState)?;
        for index in 0..seq.len() {
            seq.wait_at(index)?;
        }
        Ok(())
    }

    /// Blocks until every leaf is ready or `timeout` elapses.
    pub fn wait_for(&self, timeout: Duration) -> Result<WaitStatus, Error> {
        self.wait_until(Instant::now() + timeout)
    }

    /// Blocks until every leaf is ready or `deadline` is reached.
    pub fn wait_until(&self, deadline: Instant) -> Result<WaitStatus, Error> {
        let seq = self.seq.as_ref().ok_or(Error::NoState)?;
        for index in 0..seq.len() {
            if seq.is_ready_at(index) {
                continue;
            }

            let now = Instant::now();
            let Some(remaining) = deadline.checked_duration_since(now).filter(|d| !d.is_zero())
            else {
                return Ok(WaitStatus::Timeout);
            };

            if !seq.wait_timeout_at(index, remaining)?.is_ready() {
                return Ok(WaitStatus::Timeout);
            }
        }
        Ok(WaitStatus::Ready)
    }

    /// Waits for all leaves and returns the sequence of (ready) futures.
    pub fn get(mut self) -> Result<S, Error> {
        self.wait()?;
        self.seq.take().ok_or(Error::NoState)
    }

    /// Moves the leaf sequence out without waiting.
    pub fn release(mut self) -> Option<S> {
        self.seq.take()
    }

    /// Attaches `f` to run once every leaf is ready, on the default
    /// executor.
    ///
    /// The natural continuation shape here is the `UnwrapAll` /
    /// `UnwrapVec` rule: one argument per leaf value.
    pub fn then<F, M>(self, f: F) -> ContinuableFuture<F::Output>
    where
        F: Continuation<Self, M>,
    {
        then_via(self, default_executor(), f)
    }

    /// Attaches `f` on `executor`.
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
        then_stop_via(self, default_executor(), f)
    }
}

impl<S> FutureHandle for WaitAllFuture<S>
where
    S: FutureSequence,
{
    type Output = S;

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

    fn into_output(self) -> Result<S, Error> {
        self.get()
    }
}

// `a & b` builds a conjunction. Conjunction operands flatten: a wait-all
// proxy on either side contributes its leaves, so `(a & b) & c` is the
// three-way `when_all((a, b, c))`, never a nested proxy. A wait-any
// proxy is a single leaf, not flattened.

impl<T1, O1, T2, O2> BitAnd<BasicFuture<T2, O2>> for BasicFuture<T1, O1>
where
    T1: Send + 'static,
    O1: FutureOptions,
    T2: Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAllFuture<(BasicFuture<T1, O1>, BasicFuture<T2, O2>)>;

    fn bitand(self, rhs: BasicFuture<T2, O2>) -> Self::Output {
        when_all((self, rhs))
    }
}

impl<T1, O1, T2, O2> BitAnd<SharedFuture<T2, O2>> for BasicFuture<T1, O1>
where
    T1: Send + 'static,
    O1: FutureOptions,
    T2: Clone + Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAllFuture<(BasicFuture<T1, O1>, SharedFuture<T2, O2>)>;

    fn bitand(self, rhs: SharedFuture<T2, O2>) -> Self::Output {
        when_all((self, rhs))
    }
}

impl<T1, O1, T2, O2> BitAnd<BasicFuture<T2, O2>> for SharedFuture<T1, O1>
where
    T1: Clone + Send + 'static,
    O1: FutureOptions,
    T2: Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAllFuture<(SharedFuture<T1, O1>, BasicFuture<T2, O2>)>;

    fn bitand(self, rhs: BasicFuture<T2, O2>) -> Self::Output {
        when_all((self, rhs))
    }
}

impl<T1, O1, T2, O2> BitAnd<SharedFuture<T2, O2>> for SharedFuture<T1, O1>
where
    T1: Clone + Send + 'static,
    O1: FutureOptions,
    T2: Clone + Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAllFuture<(SharedFuture<T1, O1>, SharedFuture<T2, O2>)>;

    fn bitand(self, rhs: SharedFuture<T2, O2>) -> Self::Output {
        when_all((self, rhs))
    }
}

impl<T1, O1, S2> BitAnd<WaitAnyFuture<S2>> for BasicFuture<T1, O1>
where
    T1: Send + 'static,
    O1: FutureOptions,
    S2: FutureSequence,
{
    type Output = WaitAllFuture<(BasicFuture<T1, O1>, WaitAnyFuture<S2>)>;

    fn bitand(self, rhs: WaitAnyFuture<S2>) -> Self::Output {
        when_all((self, rhs))
    }
}

impl<T1, O1, S2> BitAnd<WaitAnyFuture<S2>> for SharedFuture<T1, O1>
where
    T1: Clone + Send + 'static,
    O1: FutureOptions,
    S2: FutureSequence,
{
    type Output = WaitAllFuture<(SharedFuture<T1, O1>, WaitAnyFuture<S2>)>;

    fn bitand(self, rhs: WaitAnyFuture<S2>) -> Self::Output {
        when_all((self, rhs))
    }
}

impl<S1, T2, O2> BitAnd<BasicFuture<T2, O2>> for WaitAnyFuture<S1>
where
    S1: FutureSequence,
    T2: Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAllFuture<(WaitAnyFuture<S1>, BasicFuture<T2, O2>)>;

    fn bitand(self, rhs: BasicFuture<T2, O2>) -> Self::Output {
        when_all((self, rhs))
    }
}

impl<S1, T2, O2> BitAnd<SharedFuture<T2, O2>> for WaitAnyFuture<S1>
where
    S1: FutureSequence,
    T2: Clone + Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAllFuture<(WaitAnyFuture<S1>, SharedFuture<T2, O2>)>;

    fn bitand(self, rhs: SharedFuture<T2, O2>) -> Self::Output {
        when_all((self, rhs))
    }
}

impl<S1, S2> BitAnd<WaitAnyFuture<S2>> for WaitAnyFuture<S1>
where
    S1: FutureSequence,
    S2: FutureSequence,
{
    type Output = WaitAllFuture<(WaitAnyFuture<S1>, WaitAnyFuture<S2>)>;

    fn bitand(self, rhs: WaitAnyFuture<S2>) -> Self::Output {
        when_all((self, rhs))
    }
}

macro_rules! impl_all_append {
    ($(($F:ident, $f:ident)),+) => {
        impl<$($F,)+ T2, O2> BitAnd<BasicFuture<T2, O2>> for WaitAllFuture<($($F,)+)>
        where
            $($F: FutureHandle,)+
            T2: Send + 'static,
            O2: FutureOptions,
        {
            type Output = WaitAllFuture<($($F,)+ BasicFuture<T2, O2>)>;

            fn bitand(self, rhs: BasicFuture<T2, O2>) -> Self::Output {
                match self.release() {
                    Some(($($f,)+)) => when_all(($($f,)+ rhs)),
                    None => WaitAllFuture::invalid(),
                }
            }
        }

        impl<$($F,)+ T2, O2> BitAnd<SharedFuture<T2, O2>> for WaitAllFuture<($($F,)+)>
        where
            $($F: FutureHandle,)+
            T2: Clone + Send + 'static,
            O2: FutureOptions,
        {
            type Output = WaitAllFuture<($($F,)+ SharedFuture<T2, O2>)>;

            fn bitand(self, rhs: SharedFuture<T2, O2>) -> Self::Output {
                match self.release() {
                    Some(($($f,)+)) => when_all(($($f,)+ rhs)),
                    None => WaitAllFuture::invalid(),
                }
            }
        }

        impl<$($F,)+ S2> BitAnd<WaitAnyFuture<S2>> for WaitAllFuture<($($F,)+)>
        where
            $($F: FutureHandle,)+
            S2: FutureSequence,
        {
            type Output = WaitAllFuture<($($F,)+ WaitAnyFuture<S2>)>;

            fn bitand(self, rhs: WaitAnyFuture<S2>) -> Self::Output {
                match self.release() {
                    Some(($($f,)+)) => when_all(($($f,)+ rhs)),
                    None => WaitAllFuture::invalid(),
                }
            }
        }

        impl<T1, O1, $($F),+> BitAnd<WaitAllFuture<($($F,)+)>> for BasicFuture<T1, O1>
        where
            T1: Send + 'static,
            O1: FutureOptions,
            $($F: FutureHandle,)+
        {
            type Output = WaitAllFuture<(BasicFuture<T1, O1>, $($F,)+)>;

            fn bitand(self, rhs: WaitAllFuture<($($F,)+)>) -> Self::Output {
                match rhs.release() {
                    Some(($($f,)+)) => when_all((self, $($f,)+)),
                    None => WaitAllFuture::invalid(),
                }
            }
        }

        impl<T1, O1, $($F),+> BitAnd<WaitAllFuture<($($F,)+)>> for SharedFuture<T1, O1>
        where
            T1: Clone + Send + 'static,
            O1: FutureOptions,
            $($F: FutureHandle,)+
        {
            type Output = WaitAllFuture<(SharedFuture<T1, O1>, $($F,)+)>;

            fn bitand(self, rhs: WaitAllFuture<($($F,)+)>) -> Self::Output {
                match rhs.release() {
                    Some(($($f,)+)) => when_all((self, $($f,)+)),
                    None => WaitAllFuture::invalid(),
                }
            }
        }

        impl<S1, $($F),+> BitAnd<WaitAllFuture<($($F,)+)>> for WaitAnyFuture<S1>
        where
            S1: FutureSequence,
            $($F: FutureHandle,)+
        {
            type Output = WaitAllFuture<(WaitAnyFuture<S1>, $($F,)+)>;

            fn bitand(self, rhs: WaitAllFuture<($($F,)+)>) -> Self::Output {
                match rhs.release() {
                    Some(($($f,)+)) => when_all((self, $($f,)+)),
                    None => WaitAllFuture::invalid(),
                }
            }
        }
    };
}

impl_all_append!((F0, f0));
impl_all_append!((F0, f0), (F1, f1));
impl_all_append!((F0, f0), (F1, f1), (F2, f2));
impl_all_append!((F0, f0), (F1, f1), (F2, f2), (F3, f3));
impl_all_append!((F0, f0), (F1, f1), (F2, f2), (F3, f3), (F4, f4));
impl_all_append!((F0, f0), (F1, f1), (F2, f2), (F3, f3), (F4, f4), (F5, f5));
impl_all_append!(
    (F0, f0),
    (F1, f1),
    (F2, f2),
    (F3, f3),
    (F4, f4),
    (F5, f5),
    (F6, f6)
);

macro_rules! impl_all_concat {
    (($(($L:ident, $l:ident)),+), ($(($R:ident, $r:ident)),+)) => {
        impl<$($L,)+ $($R),+> BitAnd<WaitAllFuture<($($R,)+)>> for WaitAllFuture<($($L,)+)>
        where
            $($L: FutureHandle,)+
            $($R: FutureHandle,)+
        {
            type Output = WaitAllFuture<($($L,)+ $($R,)+)>;

            fn bitand(self, rhs: WaitAllFuture<($($R,)+)>) -> Self::Output {
                match (self.release(), rhs.release()) {
                    (Some(($($l,)+)), Some(($($r,)+))) => when_all(($($l,)+ $($r,)+)),
                    _ => WaitAllFuture::invalid(),
                }
            }
        }
    };
}

macro_rules! impl_all_concat_lhs {
    ($lhs:tt) => {
        impl_all_concat!($lhs, ((R0, r0)));
        impl_all_concat!($lhs, ((R0, r0), (R1, r1)));
        impl_all_concat!($lhs, ((R0, r0), (R1, r1), (R2, r2)));
        impl_all_concat!($lhs, ((R0, r0), (R1, r1), (R2, r2), (R3, r3)));
    };
}

impl_all_concat_lhs!(((L0, l0)));
impl_all_concat_lhs!(((L0, l0), (L1, l1)));
impl_all_concat_lhs!(((L0, l0), (L1, l1), (L2, l2)));
impl_all_concat_lhs!(((L0, l0), (L1, l1), (L2, l2), (L3, l3)));

/// `&` on `Vec`-backed conjunctions appends an equally typed leaf.
impl<F> BitAnd<F> for WaitAllFuture<Vec<F>>
where
    F: FutureHandle,
{
    type Output = WaitAllFuture<Vec<F>>;

    fn bitand(self, rhs: F) -> Self::Output {
        match self.release() {
            Some(mut seq) => {
                seq.push(rhs);
                when_all(seq)
            }
            None => WaitAllFuture::invalid(),
        }
    }
}

impl<F> BitAnd<WaitAllFuture<Vec<F>>> for WaitAllFuture<Vec<F>>
where
    F: FutureHandle,
{
    type Output = WaitAllFuture<Vec<F>>;

    fn bitand(self, rhs: WaitAllFuture<Vec<F>>) -> Self::Output {
        match (self.release(), rhs.release()) {
            (Some(mut seq), Some(mut other)) => {
                seq.append(&mut other);
                when_all(seq)
            }
            _ => WaitAllFuture::invalid(),
        }
    }
}

/// `proxy >> f` is `proxy.then(f)` for value continuations.
impl<S, F, R> Shr<F> for WaitAllFuture<S>
where
    S: FutureSequence,
    F: FnOnce(S) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = ContinuableFuture<R>;

    fn shr(self, f: F) -> Self::Output {
        self.then(f)
    }
}

impl<S> Rem<&ExecutorHandle> for WaitAllFuture<S>
where
    S: FutureSequence,
{
    type Output = Bound<Self>;

    fn rem(self, executor: &ExecutorHandle) -> Self::Output {
        Bound::new(self, executor.clone())
    }
}

/// `proxy % ex >> f` is `proxy.then_on(&ex, f)`.
impl<S, F, R> Shr<F> for Bound<WaitAllFuture<S>>
where
    S: FutureSequence,
    F: FnOnce(S) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = ContinuableFuture<R>;

    fn shr(self, f: F) -> Self::Output {
        let (parent, executor) = self.into_parts();
        parent.then_on(&executor, f)
    }
}
