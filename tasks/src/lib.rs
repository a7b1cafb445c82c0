//! A future/promise runtime and adaptor library.
//!
//! The crate provides composable primitives for expressing asynchronous
//! computations on top of externally supplied executors: future handles
//! with cooperative cancellation and lazily attached continuations, and
//! combinators for conjunctions ([`when_all`]) and disjunctions
//! ([`when_any`]) over heterogeneous futures.
//!
//! # Launching
//!
//! [`spawn`] posts a task eagerly and returns a [`ContinuableFuture`];
//! [`schedule`] stores it in a [`DeferredFuture`] launched on first
//! wait; the `*_stoppable` variants hand the task a [`StopToken`] and
//! return stoppable futures. [`ready_future`] wraps a value that is
//! already there.
//!
//! ```no_run
//! let future = tasks::spawn(|| 6 * 7);
//! assert_eq!(future.get(), Ok(42));
//! ```
//!
//! # Continuations
//!
//! [`BasicFuture::then`] attaches a continuation; the delivery of the
//! parent's result is picked by the unwrapping rules documented at
//! [`Continuation`]. `future >> f` is operator sugar for `then`, and
//! `future % ex >> f` runs the continuation on a chosen executor.
//!
//! # Combinators
//!
//! [`when_all`] / [`when_any`] accept tuples (heterogeneous, arity ≤ 8);
//! [`when_all_iter`] / [`when_any_iter`] accept homogeneous collections.
//! `a & b` and `a | b` are the operator forms; both flatten proxies of
//! their own kind instead of nesting them.
//!
//! # Blocking and awaiting
//!
//! Every handle offers blocking `wait` / `wait_for` / `wait_until` and
//! `get`. Owned handles also implement [`std::future::Future`], so they
//! can be awaited from async code; the output is `Result<T, Error>`.

pub mod adaptor;
pub mod continuations;
pub mod stop;

mod error;
mod future;
mod launch;
mod notify;
mod promise;
mod state;
mod then;

pub use adaptor::{
    when_all, when_all_iter, when_any, when_any_iter, FutureSequence, WaitAllFuture, WaitAnyFuture,
    WaitAnyResult,
};
pub use error::{Error, WaitStatus};
pub use future::options::{self, FutureOptions, HasStopSource};
pub use future::{
    BasicFuture, ContinuableFuture, DeferredFuture, Future, FutureHandle, ReadyFuture,
    ReadyNotification, SharedContinuableFuture, SharedDeferredFuture, SharedFuture,
    SharedPlainFuture, SharedReadyFuture, SharedStoppableDeferredFuture, SharedStoppableFuture,
    StoppableDeferredFuture, StoppableFuture,
};
pub use launch::{
    err_future, ready_future, schedule, schedule_on, schedule_stoppable, schedule_stoppable_on,
    spawn, spawn_on, spawn_stoppable, spawn_stoppable_on,
};
pub use notify::NotifyCell;
pub use promise::{PackagedTask, Promise};
pub use state::Observer;
pub use stop::{StopCallback, StopSource, StopToken};
pub use then::{markers, Bound, Continuation, StopContinuation};

pub use executor::{
    default_executor, inline_executor, same_executor, Executor, ExecutorHandle, InlineExecutor,
    Job, ThreadPool,
};
