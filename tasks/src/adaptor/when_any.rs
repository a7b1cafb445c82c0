//! The wait-any combinator.
//!
//! A disjunction proxy over a sequence of futures. Unlike a conjunction,
//! a disjunction cannot simply sleep on its leaves in turn: it has to
//! learn which leaf finishes *first*. The proxy uses a hybrid strategy:
//!
//! 1. Trivial short-circuits: an empty sequence is ready, a one-element
//!    sequence delegates to the leaf's own wait.
//! 2. Lazy-only fast path: if every leaf supports lazy continuations, a
//!    notifier continuation on each leaf latches the shared notification
//!    cell and the proxy sleeps on the cell.
//! 3. General hybrid: busy-poll the non-lazy leaves with an exponential
//!    back-off; if the busy budget runs out, install one notifier thread
//!    per non-lazy leaf and sleep on the cell.
//!
//! Notifier threads are real OS threads, never executor jobs: if they
//! went through the executor, the tasks they observe could occupy every
//! executor slot and the notifiers would never run — a self-deadlock.
//! They are joinable and are cancelled, then joined, on destruction.

use std::ops::{BitOr, Rem, Shr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use executor::{default_executor, inline_executor, ExecutorHandle};

use crate::error::{Error, WaitStatus};
use crate::future::options::FutureOptions;
use crate::future::{BasicFuture, ContinuableFuture, FutureHandle, SharedFuture, StoppableFuture};
use crate::notify::NotifyCell;
use crate::state::Observer;
use crate::then::{then_stop_via, then_via, Bound, Continuation, StopContinuation};

use super::seq::FutureSequence;
use super::when_all::WaitAllFuture;

// Tuning parameters of the hybrid wait. They trade busy-poll latency
// against the cost of spawning notifier threads; none of them affect
// correctness.

/// First per-leaf slot of the busy loop. Leaves are effectively polled
/// until the busy budget is exhausted.
const BUSY_SLOT_START: Duration = Duration::from_nanos(1);

/// Growth of the per-leaf slot once the busy budget is exceeded:
/// ×5/4, plus one nanosecond so the slot grows off zero.
const BUSY_SLOT_GROWTH: (u32, u32) = (5, 4);

/// Ceiling for the per-leaf slot, divided by the leaf count: with more
/// leaves, each leaf gets a smaller share of a full scan so that a ready
/// leaf is never discovered later than a notifier thread could have been
/// spawned.
const BUSY_SLOT_CAP: Duration = Duration::from_micros(20);

/// Busy budget per leaf; the total budget is this times the leaf count.
const BUSY_BUDGET_PER_LEAF: Duration = Duration::from_millis(100);

/// Length of the initial busy phase before notifier threads are
/// installed. Deadlines shorter than this never pay for notifiers.
const MAX_BUSY_WAIT: Duration = Duration::from_secs(5);

/// Slice a notifier sleeps on its leaf between cancel-flag and
/// notification-cell checks.
const NOTIFIER_SLICE: Duration = Duration::from_secs(1);

/// Start-gate back-off, used while spawned notifiers have not begun
/// executing: base, growth ×3/2, capped.
const START_GATE_BASE: Duration = Duration::from_micros(20);
const START_GATE_CAP: Duration = Duration::from_secs(1);

/// Result of a disjunction: the index of the first ready leaf and the
/// full leaf sequence.
///
/// `index` is `None` only for the empty sequence. The ready leaf is
/// recovered by scanning; with several leaves ready, the lowest index
/// wins.
#[derive(Debug)]
pub struct WaitAnyResult<S> {
    pub index: Option<usize>,
    pub tasks: S,
}

/// Creates a disjunction over `seq` (a tuple of futures, arity ≤ 8).
pub fn when_any<S>(seq: S) -> WaitAnyFuture<S>
where
    S: FutureSequence,
{
    WaitAnyFuture::new(seq)
}

/// Creates a disjunction over a dynamic collection of futures.
pub fn when_any_iter<F, I>(futures: I) -> WaitAnyFuture<Vec<F>>
where
    F: FutureHandle,
    I: IntoIterator<Item = F>,
{
    when_any(futures.into_iter().collect())
}

struct Notifier {
    thread: Option<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    started: Arc<AtomicBool>,
}

/// Proxy future over a disjunction of futures.
pub struct WaitAnyFuture<S>
where
    S: FutureSequence,
{
    seq: Option<S>,
    notifiers: Vec<Notifier>,
    thread_notifiers_set: bool,
    lazy_notifiers_set: bool,
    cell: Arc<NotifyCell>,
}

impl<S> WaitAnyFuture<S>
where
    S: FutureSequence,
{
    pub(crate) fn new(seq: S) -> Self {
        let mut this = Self {
            seq: Some(seq),
            notifiers: Vec::new(),
            thread_notifiers_set: false,
            lazy_notifiers_set: false,
            cell: Arc::new(NotifyCell::new()),
        };
        this.set_up_lazy_notifiers();
        this
    }

    pub(crate) fn invalid() -> Self {
        Self {
            seq: None,
            notifiers: Vec::new(),
            thread_notifiers_set: false,
            lazy_notifiers_set: false,
            cell: Arc::new(NotifyCell::new()),
        }
    }

    /// `true` while the proxy holds its sequence and the sequence is
    /// empty or holds at least one valid leaf.
    pub fn valid(&self) -> bool {
        self.seq
            .as_ref()
            .is_some_and(|seq| seq.is_empty() || seq.any_valid())
    }

    /// `true` once any leaf is ready (or the sequence is empty).
    pub fn is_ready(&self) -> bool {
        self.seq
            .as_ref()
            .is_some_and(|seq| seq.is_empty() || seq.ready_index().is_some())
    }

    /// Blocks until any leaf is ready.
    pub fn wait(&mut self) -> Result<(), Error> {
        self.wait_deadline(None).map(|_| ())
    }

    /// Blocks until any leaf is ready or `timeout` elapses.
    pub fn wait_for(&mut self, timeout: Duration) -> Result<WaitStatus, Error> {
        self.wait_deadline(Some(Instant::now() + timeout))
    }

    /// Blocks until any leaf is ready or `deadline` is reached.
    pub fn wait_until(&mut self, deadline: Instant) -> Result<WaitStatus, Error> {
        self.wait_deadline(Some(deadline))
    }

    /// Waits, then returns the ready index and the leaf sequence.
    pub fn get(mut self) -> Result<WaitAnyResult<S>, Error> {
        self.wait()?;
        let index = self.seq.as_ref().and_then(|seq| seq.ready_index());
        self.cancel_and_join_notifiers();
        let tasks = self.seq.take().ok_or(Error::NoState)?;
        Ok(WaitAnyResult { index, tasks })
    }

    /// Moves the leaf sequence out without waiting.
    ///
    /// Notifiers are asked to stop; they are joined when the emptied
    /// proxy is dropped.
    pub fn release(mut self) -> Option<S> {
        for notifier in &self.notifiers {
            notifier.cancel.store(true, Ordering::Release);
        }
        self.seq.take()
    }

    /// Attaches `f` to run once any leaf is ready, on the default
    /// executor.
    ///
    /// The select rules apply: `f` may take the whole
    /// [`WaitAnyResult`], the `(index, sequence)` split, the exploded
    /// tuple, or (for homogeneous sequences) the chosen future or value.
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

    fn ready_index(&self) -> Option<usize> {
        self.seq.as_ref().and_then(|seq| seq.ready_index())
    }

    fn lazy_count(&self) -> usize {
        self.seq.as_ref().map_or(0, |seq| {
            (0..seq.len())
                .filter(|&index| seq.lazy_continuable_at(index))
                .count()
        })
    }

    fn all_lazy(&self) -> bool {
        self.seq
            .as_ref()
            .is_some_and(|seq| self.lazy_count() == seq.len())
    }

    /// `true` if every non-lazy leaf can be watched by a notifier
    /// thread. Proxy leaves have no single state to observe; with such a
    /// leaf the wait stays busy.
    fn thread_notifiers_possible(&self) -> bool {
        self.seq.as_ref().is_some_and(|seq| {
            (0..seq.len())
                .all(|index| seq.lazy_continuable_at(index) || seq.observer_at(index).is_some())
        })
    }

    fn set_up_lazy_notifiers(&mut self) {
        if self.lazy_notifiers_set {
            return;
        }
        self.lazy_notifiers_set = true;

        let Some(seq) = self.seq.as_ref() else {
            return;
        };

        // A notifier continuation only latches the shared cell. It runs
        // inline with the leaf's completion; if the leaf is already
        // ready the list posts it through the inline executor, which
        // also runs it here and now.
        let inline = inline_executor();
        for index in 0..seq.len() {
            let Some(list) = seq.continuation_list_at(index) else {
                continue;
            };
            let cell = self.cell.clone();
            list.emplace(&inline, Box::new(move || cell.latch()));
        }
    }

    fn set_up_thread_notifiers(&mut self) {
        if self.thread_notifiers_set {
            return;
        }
        self.thread_notifiers_set = true;

        let Some(seq) = self.seq.as_ref() else {
            return;
        };

        for index in 0..seq.len() {
            if seq.lazy_continuable_at(index) {
                continue;
            }
            let Some(observer) = seq.observer_at(index) else {
                continue;
            };

            let cancel = Arc::new(AtomicBool::new(false));
            let started = Arc::new(AtomicBool::new(false));
            let cell = self.cell.clone();

            tracing::debug!("spawning wait-any notifier for leaf {}", index);

            let thread = {
                let cancel = cancel.clone();
                let started = started.clone();
                std::thread::Builder::new()
                    .name("wait-any-notifier".to_owned())
                    .spawn(move || notifier_main(&observer, &cell, &cancel, &started))
                    .expect("failed to spawn wait-any notifier")
            };

            self.notifiers.push(Notifier {
                thread: Some(thread),
                cancel,
                started,
            });
        }
    }

    fn notifiers_started(&self) -> bool {
        self.notifiers
            .iter()
            .all(|notifier| notifier.started.load(Ordering::Acquire))
    }

    fn cancel_and_join_notifiers(&mut self) {
        for notifier in &self.notifiers {
            notifier.cancel.store(true, Ordering::Release);
        }
        for notifier in &mut self.notifiers {
            if let Some(thread) = notifier.thread.take() {
                thread.join().ok();
            }
        }
        self.notifiers.clear();
        self.thread_notifiers_set = false;
    }

    fn wait_deadline(&mut self, deadline: Option<Instant>) -> Result<WaitStatus, Error> {
        if !self.valid() {
            return Err(Error::NoState);
        }

        if let Some(status) = self.trivial_wait(deadline)? {
            return Ok(status);
        }

        // Notifiers already cover every leaf: sleep on the cell.
        if self.all_lazy() || self.thread_notifiers_set {
            return self.notifier_wait(deadline);
        }

        let now = Instant::now();
        let no_time_for_notifiers =
            deadline.is_some_and(|d| d.saturating_duration_since(now) < MAX_BUSY_WAIT);
        let too_many_threads_already = self.len() >= available_parallelism();
        let busy_only =
            no_time_for_notifiers || too_many_threads_already || !self.thread_notifiers_possible();
        if busy_only {
            return self.busy_wait(deadline);
        }

        let status = self.busy_wait(Some(Instant::now() + MAX_BUSY_WAIT))?;
        if status.is_ready() {
            return Ok(status);
        }

        self.set_up_thread_notifiers();
        self.notifier_wait(deadline)
    }

    /// The wait path available through `&self` (trait waits): notifiers
    /// cannot be installed, so past the fast paths this stays busy.
    fn wait_deadline_const(&self, deadline: Option<Instant>) -> Result<WaitStatus, Error> {
        if !self.valid() {
            return Err(Error::NoState);
        }

        if let Some(status) = self.trivial_wait(deadline)? {
            return Ok(status);
        }

        if self.all_lazy() || self.thread_notifiers_set {
            return self.notifier_wait(deadline);
        }

        self.busy_wait(deadline)
    }

    /// Handles the empty, one-element and already-ready cases.
    fn trivial_wait(&self, deadline: Option<Instant>) -> Result<Option<WaitStatus>, Error> {
        let seq = self.seq.as_ref().ok_or(Error::NoState)?;

        match seq.len() {
            0 => return Ok(Some(WaitStatus::Ready)),
            1 => {
                // One leaf: delegate to the leaf's own wait.
                return match deadline {
                    None => {
                        seq.wait_at(0)?;
                        Ok(Some(WaitStatus::Ready))
                    }
                    Some(deadline) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        Ok(Some(seq.wait_timeout_at(0, remaining)?))
                    }
                };
            }
            _ => {}
        }

        if seq.ready_index().is_some() {
            return Ok(Some(WaitStatus::Ready));
        }
        Ok(None)
    }

    fn len(&self) -> usize {
        self.seq.as_ref().map_or(0, FutureSequence::len)
    }

    /// Busy-polls the non-lazy leaves, growing the per-leaf slot
    /// geometrically once the budget is spent. Lazy leaves are observed
    /// through the notification cell instead.
    fn busy_wait(&self, deadline: Option<Instant>) -> Result<WaitStatus, Error> {
        let seq = self.seq.as_ref().ok_or(Error::NoState)?;
        let n = seq.len();

        let start = Instant::now();
        let budget = BUSY_BUDGET_PER_LEAF.saturating_mul(n as u32);
        let slot_cap = (BUSY_SLOT_CAP / n as u32).max(Duration::from_nanos(1));
        let lazy_leaves = self.lazy_count();
        let mut slot = BUSY_SLOT_START;

        loop {
            // Lazy leaves signal through the cell; give it one slot.
            if lazy_leaves > 0 && self.cell.wait_for(slot) {
                return Ok(WaitStatus::Ready);
            }

            let use_backoff = start.elapsed() > budget;

            for index in 0..n {
                if seq.lazy_continuable_at(index) {
                    continue;
                }

                if use_backoff {
                    slot = grow_slot(slot, slot_cap);
                }

                if seq.wait_timeout_at(index, slot)?.is_ready() {
                    return Ok(WaitStatus::Ready);
                }

                // Once slots have grown, a full scan takes long enough
                // that another leaf may have finished mid-scan.
                if use_backoff && seq.ready_index().is_some() {
                    return Ok(WaitStatus::Ready);
                }

                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Ok(WaitStatus::Timeout);
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(WaitStatus::Timeout);
            }
        }
    }

    /// Sleeps on the notification cell, first gating on the spawned
    /// notifiers having actually started: a notifier the executor of
    /// the observed tasks has starved out must be waited for with busy
    /// polling, not trusted.
    fn notifier_wait(&self, deadline: Option<Instant>) -> Result<WaitStatus, Error> {
        if self.thread_notifiers_set && !self.notifiers_started() {
            let mut gate = START_GATE_BASE;
            loop {
                if let Some(d) = deadline {
                    if d.saturating_duration_since(Instant::now()) < gate {
                        return self.busy_wait(Some(d));
                    }
                }

                let status = self.busy_wait(Some(Instant::now() + gate))?;
                if status.is_ready() {
                    return Ok(status);
                }
                if self.notifiers_started() {
                    break;
                }

                gate = grow_gate(gate);
            }
        }

        match deadline {
            Some(deadline) => {
                if self.cell.wait_until(deadline) || self.ready_index().is_some() {
                    Ok(WaitStatus::Ready)
                } else {
                    Ok(WaitStatus::Timeout)
                }
            }
            None => loop {
                // Re-scan between slices: the cell covers the notifier
                // paths, the scan covers anything they might have missed.
                if self.cell.wait_for(NOTIFIER_SLICE) {
                    return Ok(WaitStatus::Ready);
                }
                if self.ready_index().is_some() {
                    return Ok(WaitStatus::Ready);
                }
            },
        }
    }
}

fn grow_slot(slot: Duration, cap: Duration) -> Duration {
    let nanos = slot.as_nanos() as u64;
    let grown = nanos
        .saturating_mul(u64::from(BUSY_SLOT_GROWTH.0))
        .checked_div(u64::from(BUSY_SLOT_GROWTH.1))
        .unwrap_or(nanos)
        .saturating_add(1);
    Duration::from_nanos(grown).min(cap)
}

fn grow_gate(gate: Duration) -> Duration {
    gate.saturating_mul(3).checked_div(2).unwrap_or(gate).min(START_GATE_CAP)
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Body of a notifier thread watching one leaf.
fn notifier_main(
    observer: &Observer,
    cell: &Arc<NotifyCell>,
    cancel: &Arc<AtomicBool>,
    started: &Arc<AtomicBool>,
) {
    started.store(true, Ordering::Release);

    if cancel.load(Ordering::Acquire) {
        return;
    }

    if observer.is_ready() {
        cell.latch();
        return;
    }

    loop {
        if observer.wait_ready_for(NOTIFIER_SLICE) {
            break;
        }
        if cancel.load(Ordering::Acquire) {
            tracing::debug!("wait-any notifier cancelled");
            return;
        }
        // Another leaf may have won; this notifier is no longer needed.
        if cell.is_set() {
            return;
        }
    }

    cell.latch();
}

impl<S> Drop for WaitAnyFuture<S>
where
    S: FutureSequence,
{
    fn drop(&mut self) {
        // Notifiers hold observers, not references into this proxy, but
        // they must not outlive it either: cancel and join them. The
        // leaves themselves are dropped afterwards with their usual
        // joining semantics; no stop request is propagated to them from
        // here.
        self.cancel_and_join_notifiers();
    }
}

impl<S> std::fmt::Debug for WaitAnyFuture<S>
where
    S: FutureSequence,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitAnyFuture")
            .field("valid", &self.seq.is_some())
            .field("notifiers", &self.notifiers.len())
            .finish_non_exhaustive()
    }
}

impl<S> FutureHandle for WaitAnyFuture<S>
where
    S: FutureSequence,
{
    type Output = WaitAnyResult<S>;

    fn valid(&self) -> bool {
        Self::valid(self)
    }

    fn is_ready(&self) -> bool {
        Self::is_ready(self)
    }

    fn wait(&self) -> Result<(), Error> {
        self.wait_deadline_const(None).map(|_| ())
    }

    fn wait_for(&self, timeout: Duration) -> Result<WaitStatus, Error> {
        self.wait_deadline_const(Some(Instant::now() + timeout))
    }

    fn into_output(self) -> Result<WaitAnyResult<S>, Error> {
        self.get()
    }
}

// `a | b` builds a disjunction. Disjunction operands flatten: a wait-any
// proxy on either side contributes its leaves, so `(a | b) | c` is the
// three-way `when_any((a, b, c))`, never a nested proxy. A wait-all
// proxy is a single leaf, not flattened.

impl<T1, O1, T2, O2> BitOr<BasicFuture<T2, O2>> for BasicFuture<T1, O1>
where
    T1: Send + 'static,
    O1: FutureOptions,
    T2: Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAnyFuture<(BasicFuture<T1, O1>, BasicFuture<T2, O2>)>;

    fn bitor(self, rhs: BasicFuture<T2, O2>) -> Self::Output {
        when_any((self, rhs))
    }
}

impl<T1, O1, T2, O2> BitOr<SharedFuture<T2, O2>> for BasicFuture<T1, O1>
where
    T1: Send + 'static,
    O1: FutureOptions,
    T2: Clone + Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAnyFuture<(BasicFuture<T1, O1>, SharedFuture<T2, O2>)>;

    fn bitor(self, rhs: SharedFuture<T2, O2>) -> Self::Output {
        when_any((self, rhs))
    }
}

impl<T1, O1, T2, O2> BitOr<BasicFuture<T2, O2>> for SharedFuture<T1, O1>
where
    T1: Clone + Send + 'static,
    O1: FutureOptions,
    T2: Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAnyFuture<(SharedFuture<T1, O1>, BasicFuture<T2, O2>)>;

    fn bitor(self, rhs: BasicFuture<T2, O2>) -> Self::Output {
        when_any((self, rhs))
    }
}

impl<T1, O1, T2, O2> BitOr<SharedFuture<T2, O2>> for SharedFuture<T1, O1>
where
    T1: Clone + Send + 'static,
    O1: FutureOptions,
    T2: Clone + Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAnyFuture<(SharedFuture<T1, O1>, SharedFuture<T2, O2>)>;

    fn bitor(self, rhs: SharedFuture<T2, O2>) -> Self::Output {
        when_any((self, rhs))
    }
}

impl<T1, O1, S2> BitOr<WaitAllFuture<S2>> for BasicFuture<T1, O1>
where
    T1: Send + 'static,
    O1: FutureOptions,
    S2: FutureSequence,
{
    type Output = WaitAnyFuture<(BasicFuture<T1, O1>, WaitAllFuture<S2>)>;

    fn bitor(self, rhs: WaitAllFuture<S2>) -> Self::Output {
        when_any((self, rhs))
    }
}

impl<T1, O1, S2> BitOr<WaitAllFuture<S2>> for SharedFuture<T1, O1>
where
    T1: Clone + Send + 'static,
    O1: FutureOptions,
    S2: FutureSequence,
{
    type Output = WaitAnyFuture<(SharedFuture<T1, O1>, WaitAllFuture<S2>)>;

    fn bitor(self, rhs: WaitAllFuture<S2>) -> Self::Output {
        when_any((self, rhs))
    }
}

impl<S1, T2, O2> BitOr<BasicFuture<T2, O2>> for WaitAllFuture<S1>
where
    S1: FutureSequence,
    T2: Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAnyFuture<(WaitAllFuture<S1>, BasicFuture<T2, O2>)>;

    fn bitor(self, rhs: BasicFuture<T2, O2>) -> Self::Output {
        when_any((self, rhs))
    }
}

impl<S1, T2, O2> BitOr<SharedFuture<T2, O2>> for WaitAllFuture<S1>
where
    S1: FutureSequence,
    T2: Clone + Send + 'static,
    O2: FutureOptions,
{
    type Output = WaitAnyFuture<(WaitAllFuture<S1>, SharedFuture<T2, O2>)>;

    fn bitor(self, rhs: SharedFuture<T2, O2>) -> Self::Output {
        when_any((self, rhs))
    }
}

impl<S1, S2> BitOr<WaitAllFuture<S2>> for WaitAllFuture<S1>
where
    S1: FutureSequence,
    S2: FutureSequence,
{
    type Output = WaitAnyFuture<(WaitAllFuture<S1>, WaitAllFuture<S2>)>;

    fn bitor(self, rhs: WaitAllFuture<S2>) -> Self::Output {
        when_any((self, rhs))
    }
}

macro_rules! impl_any_append {
    ($(($F:ident, $f:ident)),+) => {
        impl<$($F,)+ T2, O2> BitOr<BasicFuture<T2, O2>> for WaitAnyFuture<($($F,)+)>
        where
            $($F: FutureHandle,)+
            T2: Send + 'static,
            O2: FutureOptions,
        {
            type Output = WaitAnyFuture<($($F,)+ BasicFuture<T2, O2>)>;

            fn bitor(self, rhs: BasicFuture<T2, O2>) -> Self::Output {
                match self.release() {
                    Some(($($f,)+)) => when_any(($($f,)+ rhs)),
                    None => WaitAnyFuture::invalid(),
                }
            }
        }

        impl<$($F,)+ T2, O2> BitOr<SharedFuture<T2, O2>> for WaitAnyFuture<($($F,)+)>
        where
            $($F: FutureHandle,)+
            T2: Clone + Send + 'static,
            O2: FutureOptions,
        {
            type Output = WaitAnyFuture<($($F,)+ SharedFuture<T2, O2>)>;

            fn bitor(self, rhs: SharedFuture<T2, O2>) -> Self::Output {
                match self.release() {
                    Some(($($f,)+)) => when_any(($($f,)+ rhs)),
                    None => WaitAnyFuture::invalid(),
                }
            }
        }

        impl<$($F,)+ S2> BitOr<WaitAllFuture<S2>> for WaitAnyFuture<($($F,)+)>
        where
            $($F: FutureHandle,)+
            S2: FutureSequence,
        {
            type Output = WaitAnyFuture<($($F,)+ WaitAllFuture<S2>)>;

            fn bitor(self, rhs: WaitAllFuture<S2>) -> Self::Output {
                match self.release() {
                    Some(($($f,)+)) => when_any(($($f,)+ rhs)),
                    None => WaitAnyFuture::invalid(),
                }
            }
        }

        impl<T1, O1, $($F),+> BitOr<WaitAnyFuture<($($F,)+)>> for BasicFuture<T1, O1>
        where
            T1: Send + 'static,
            O1: FutureOptions,
            $($F: FutureHandle,)+
        {
            type Output = WaitAnyFuture<(BasicFuture<T1, O1>, $($F,)+)>;

            fn bitor(self, rhs: WaitAnyFuture<($($F,)+)>) -> Self::Output {
                match rhs.release() {
                    Some(($($f,)+)) => when_any((self, $($f,)+)),
                    None => WaitAnyFuture::invalid(),
                }
            }
        }

        impl<T1, O1, $($F),+> BitOr<WaitAnyFuture<($($F,)+)>> for SharedFuture<T1, O1>
        where
            T1: Clone + Send + 'static,
            O1: FutureOptions,
            $($F: FutureHandle,)+
        {
            type Output = WaitAnyFuture<(SharedFuture<T1, O1>, $($F,)+)>;

            fn bitor(self, rhs: WaitAnyFuture<($($F,)+)>) -> Self::Output {
                match rhs.release() {
                    Some(($($f,)+)) => when_any((self, $($f,)+)),
                    None => WaitAnyFuture::invalid(),
                }
            }
        }

        impl<S1, $($F),+> BitOr<WaitAnyFuture<($($F,)+)>> for WaitAllFuture<S1>
        where
            S1: FutureSequence,
            $($F: FutureHandle,)+
        {
            type Output = WaitAnyFuture<(WaitAllFuture<S1>, $($F,)+)>;

            fn bitor(self, rhs: WaitAnyFuture<($($F,)+)>) -> Self::Output {
                match rhs.release() {
                    Some(($($f,)+)) => when_any((self, $($f,)+)),
                    None => WaitAnyFuture::invalid(),
                }
            }
        }
    };
}

impl_any_append!((F0, f0));
impl_any_append!((F0, f0), (F1, f1));
impl_any_append!((F0, f0), (F1, f1), (F2, f2));
impl_any_append!((F0, f0), (F1, f1), (F2, f2), (F3, f3));
impl_any_append!((F0, f0), (F1, f1), (F2, f2), (F3, f3), (F4, f4));
impl_any_append!((F0, f0), (F1, f1), (F2, f2), (F3, f3), (F4, f4), (F5, f5));
impl_any_append!(
    (F0, f0),
    (F1, f1),
    (F2, f2),
    (F3, f3),
    (F4, f4),
    (F5, f5),
    (F6, f6)
);

macro_rules! impl_any_concat {
    (($(($L:ident, $l:ident)),+), ($(($R:ident, $r:ident)),+)) => {
        impl<$($L,)+ $($R),+> BitOr<WaitAnyFuture<($($R,)+)>> for WaitAnyFuture<($($L,)+)>
        where
            $($L: FutureHandle,)+
            $($R: FutureHandle,)+
        {
            type Output = WaitAnyFuture<($($L,)+ $($R,)+)>;

            fn bitor(self, rhs: WaitAnyFuture<($($R,)+)>) -> Self::Output {
                match (self.release(), rhs.release()) {
                    (Some(($($l,)+)), Some(($($r,)+))) => when_any(($($l,)+ $($r,)+)),
                    _ => WaitAnyFuture::invalid(),
                }
            }
        }
    };
}

macro_rules! impl_any_concat_lhs {
    ($lhs:tt) => {
        impl_any_concat!($lhs, ((R0, r0)));
        impl_any_concat!($lhs, ((R0, r0), (R1, r1)));
        impl_any_concat!($lhs, ((R0, r0), (R1, r1), (R2, r2)));
        impl_any_concat!($lhs, ((R0, r0), (R1, r1), (R2, r2), (R3, r3)));
    };
}

impl_any_concat_lhs!(((L0, l0)));
impl_any_concat_lhs!(((L0, l0), (L1, l1)));
impl_any_concat_lhs!(((L0, l0), (L1, l1), (L2, l2)));
impl_any_concat_lhs!(((L0, l0), (L1, l1), (L2, l2), (L3, l3)));

/// `|` on `Vec`-backed disjunctions appends an equally typed leaf.
impl<F> BitOr<F> for WaitAnyFuture<Vec<F>>
where
    F: FutureHandle,
{
    type Output = WaitAnyFuture<Vec<F>>;

    fn bitor(self, rhs: F) -> Self::Output {
        match self.release() {
            Some(mut seq) => {
                seq.push(rhs);
                when_any(seq)
            }
            None => WaitAnyFuture::invalid(),
        }
    }
}

impl<F> BitOr<WaitAnyFuture<Vec<F>>> for WaitAnyFuture<Vec<F>>
where
    F: FutureHandle,
{
    type Output = WaitAnyFuture<Vec<F>>;

    fn bitor(self, rhs: WaitAnyFuture<Vec<F>>) -> Self::Output {
        match (self.release(), rhs.release()) {
            (Some(mut seq), Some(mut other)) => {
                seq.append(&mut other);
                when_any(seq)
            }
            _ => WaitAnyFuture::invalid(),
        }
    }
}

/// `proxy >> f` is `proxy.then(f)` for value continuations.
impl<S, F, R> Shr<F> for WaitAnyFuture<S>
where
    S: FutureSequence,
    F: FnOnce(WaitAnyResult<S>) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = ContinuableFuture<R>;

    fn shr(self, f: F) -> Self::Output {
        self.then(f)
    }
}

impl<S> Rem<&ExecutorHandle> for WaitAnyFuture<S>
where
    S: FutureSequence,
{
    type Output = Bound<Self>;

    fn rem(self, executor: &ExecutorHandle) -> Self::Output {
        Bound::new(self, executor.clone())
    }
}

/// `proxy % ex >> f` is `proxy.then_on(&ex, f)`.
impl<S, F, R> Shr<F> for Bound<WaitAnyFuture<S>>
where
    S: FutureSequence,
    F: FnOnce(WaitAnyResult<S>) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = ContinuableFuture<R>;

    fn shr(self, f: F) -> Self::Output {
        let (parent, executor) = self.into_parts();
        parent.then_on(&executor, f)
    }
}
