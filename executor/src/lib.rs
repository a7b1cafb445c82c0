//! Executor contract and the executors shipped with it.
//!
//! An executor is anything that can run a nullary job: enqueue it
//! ([`Executor::post`]), run it possibly inline ([`Executor::dispatch`]) or
//! enqueue it behind other pending work ([`Executor::defer`]). Executors are
//! passed around type-erased as [`ExecutorHandle`]; copying a handle is an
//! `Arc` clone and two handles compare equal when they point at the same
//! executor.

pub mod park;
pub mod pool;

use std::sync::{Arc, OnceLock};

pub use pool::ThreadPool;

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An executor that can run nullary jobs.
pub trait Executor: Send + Sync {
    /// Enqueues `job` for execution on an unspecified thread.
    fn post(&self, job: Job);

    /// Runs `job`, possibly inline on the calling thread.
    fn dispatch(&self, job: Job);

    /// Enqueues `job` with the hint that other pending work should run
    /// first.
    fn defer(&self, job: Job);
}

/// Shared, type-erased handle to an executor.
pub type ExecutorHandle = Arc<dyn Executor>;

/// Returns `true` if both handles refer to the same executor.
pub fn same_executor(a: &ExecutorHandle, b: &ExecutorHandle) -> bool {
    Arc::ptr_eq(a, b)
}

/// An executor that runs every job on the calling thread.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn post(&self, job: Job) {
        job();
    }

    fn dispatch(&self, job: Job) {
        job();
    }

    fn defer(&self, job: Job) {
        job();
    }
}

/// Returns a handle to the process-wide inline executor.
pub fn inline_executor() -> ExecutorHandle {
    static INLINE: OnceLock<ExecutorHandle> = OnceLock::new();
    INLINE.get_or_init(|| Arc::new(InlineExecutor)).clone()
}

/// Returns a handle to the process-wide default thread pool.
///
/// The pool is created on first use with one worker per available core and
/// lives for the remainder of the process. Every call returns the same
/// handle, so default-executor handles compare equal.
pub fn default_executor() -> ExecutorHandle {
    static DEFAULT: OnceLock<ThreadPool> = OnceLock::new();
    static HANDLE: OnceLock<ExecutorHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| {
            DEFAULT
                .get_or_init(|| ThreadPool::new(default_thread_count()))
                .handle()
        })
        .clone()
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::mpsc;

    use super::{default_executor, inline_executor, same_executor};

    #[test]
    fn inline_executor_runs_inline() {
        let ex = inline_executor();
        let mut ran = false;

        // The job borrows the flag; it can only do that because the job
        // runs before `post` returns.
        let (tx, rx) = mpsc::channel();
        ex.post(Box::new(move || {
            tx.send(()).ok();
        }));
        if rx.try_recv().is_ok() {
            ran = true;
        }

        assert!(ran);
    }

    #[test]
    fn handle_equality_is_identity() {
        let a = inline_executor();
        let b = inline_executor();
        let c = default_executor();

        assert!(same_executor(&a, &b));
        assert!(!same_executor(&a, &c));
    }
}
