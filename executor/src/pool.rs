//! Fixed-size worker pool executor.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use crate::park::Parker;
use crate::{Executor, ExecutorHandle, Job};

/// A fixed-size thread pool.
///
/// Jobs are pushed into a shared injector queue and picked up by the first
/// idle worker. Dropping the pool waits for the queue to drain and joins
/// all workers.
#[derive(Debug)]
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct Shared {
    queue: SegQueue<Job>,
    // Parkers of the currently idle workers. A worker registers itself
    // before parking; `post` pops one entry and deposits its token.
    sleepers: Mutex<Vec<Arc<Parker>>>,
    shutdown: AtomicBool,
}

impl Shared {
    fn wake_one(&self) {
        if let Some(parker) = self.sleepers.lock().pop() {
            parker.unpark();
        }
    }

    fn wake_all(&self) {
        for parker in self.sleepers.lock().drain(..) {
            parker.unpark();
        }
    }
}

impl ThreadPool {
    /// Creates a new `ThreadPool` with `threads` worker threads.
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);

        let shared = Arc::new(Shared {
            queue: SegQueue::new(),
            sleepers: Mutex::new(Vec::with_capacity(threads)),
            shutdown: AtomicBool::new(false),
        });

        let workers = (0..threads)
            .map(|id| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("pool-worker-{}", id))
                    .spawn(move || run_worker(id, &shared))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        Self { shared, workers }
    }

    /// Returns an executor handle backed by this pool.
    ///
    /// The handle stays usable for as long as the pool is alive; jobs
    /// posted during shutdown may not run.
    pub fn handle(&self) -> ExecutorHandle {
        Arc::new(PoolHandle {
            shared: self.shared.clone(),
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake_all();

        for worker in self.workers.drain(..) {
            // A worker that panicked through a job is already logged by
            // the catch in `run_worker`; nothing useful left to do here.
            worker.join().ok();
        }
    }
}

fn run_worker(id: usize, shared: &Arc<Shared>) {
    tracing::debug!("pool worker {} running", id);

    let parker = Arc::new(Parker::new());

    loop {
        if let Some(job) = shared.queue.pop() {
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!("job panicked on pool worker {}", id);
            }
            continue;
        }

        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        shared.sleepers.lock().push(parker.clone());

        // Re-check after registering. A job pushed between our `pop` and
        // the registration may have missed us; the token protocol absorbs
        // the spurious unpark that can result from taking this path.
        if !shared.queue.is_empty() || shared.shutdown.load(Ordering::Acquire) {
            continue;
        }

        parker.park();
    }

    tracing::debug!("pool worker {} exiting", id);
}

#[derive(Debug)]
struct PoolHandle {
    shared: Arc<Shared>,
}

impl Executor for PoolHandle {
    fn post(&self, job: Job) {
        self.shared.queue.push(job);
        self.shared.wake_one();
    }

    fn dispatch(&self, job: Job) {
        // Dispatch is allowed to run inline; going through the queue is
        // the conservative choice that keeps callers off the job's stack.
        self.post(job);
    }

    fn defer(&self, job: Job) {
        // The queue is FIFO, so pushing already lets pending work run
        // first; the defer hint needs no separate treatment.
        self.post(job);
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;

    use super::ThreadPool;

    #[test]
    fn pool_runs_jobs() {
        let pool = ThreadPool::new(2);
        let handle = pool.handle();

        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        for _ in 0..64 {
            let counter = counter.clone();
            let tx = tx.clone();
            handle.post(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                tx.send(()).ok();
            }));
        }

        for _ in 0..64 {
            rx.recv().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn pool_survives_panicking_job() {
        let pool = ThreadPool::new(1);
        let handle = pool.handle();

        handle.post(Box::new(|| panic!("boom")));

        let (tx, rx) = mpsc::channel();
        handle.post(Box::new(move || {
            tx.send(7).ok();
        }));

        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[test]
    fn drop_joins_workers() {
        let pool = ThreadPool::new(4);
        let handle = pool.handle();

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = counter.clone();
            handle.post(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }));
        }

        drop(pool);
        assert_eq!(counter.load(Ordering::Relaxed), 16);
    }
}
