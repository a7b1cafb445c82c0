#![cfg(not(loom))]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use tasks::{
    ready_future, schedule, spawn, spawn_on, spawn_stoppable, Error, Promise, StopToken,
    ThreadPool, WaitStatus,
};

#[test]
fn basic_spawn() {
    let future = spawn(|| 42);
    assert!(future.valid());
    assert_eq!(future.get(), Ok(42));
}

#[test]
fn continuation_chain() {
    let future = spawn(|| 2).then(|x: i32| x * 2).then(|x: i32| x + 1);
    assert_eq!(future.get(), Ok(5));
}

#[test]
fn stop_token_loop() {
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
fn broken_promise() {
    let mut promise = Promise::<u32>::new();
    let future = promise.future().unwrap();
    drop(promise);

    assert_eq!(future.get(), Err(Error::BrokenPromise));
}

#[test]
fn wait_marks_ready() {
    let future = spawn(|| "done");
    future.wait().unwrap();
    assert!(future.is_ready());
    assert_eq!(future.get(), Ok("done"));
}

#[test]
fn wait_for_zero_on_unready_future_times_out() {
    let mut promise = Promise::<u32>::new();
    let mut future = promise.future().unwrap();

    let start = Instant::now();
    assert_eq!(future.wait_for(Duration::ZERO), Ok(WaitStatus::Timeout));
    assert!(start.elapsed() < Duration::from_secs(1));

    future.detach();
}

#[test]
fn timed_wait_then_blocking_wait() {
    let mut promise = Promise::new();
    let future = promise.future().unwrap();

    assert_eq!(
        future.wait_for(Duration::from_millis(5)),
        Ok(WaitStatus::Timeout)
    );

    promise.set_value(3).unwrap();
    assert_eq!(future.wait_for(Duration::from_millis(5)), Ok(WaitStatus::Ready));
    assert_eq!(future.get(), Ok(3));
}

#[test]
fn ready_future_round_trip() {
    let future = ready_future(String::from("v"));
    assert!(future.is_ready());
    assert_eq!(future.get(), Ok(String::from("v")));
}

#[test]
fn shared_get_is_idempotent() {
    let shared = spawn(|| 11).share();
    let clone = shared.clone();

    assert_eq!(shared.get(), Ok(11));
    assert_eq!(shared.get(), Ok(11));
    assert_eq!(clone.get(), Ok(11));
}

#[test]
fn shared_future_observes_panic() {
    let shared = spawn(|| -> u32 { panic!("oops") }).share();
    assert_eq!(shared.get(), Err(Error::Panicked("oops".to_owned())));
    assert_eq!(shared.get(), Err(Error::Panicked("oops".to_owned())));
}

#[test]
fn then_identity_preserves_value() {
    let future = spawn(|| 5).then(|x: i32| x);
    assert_eq!(future.get(), Ok(5));
}

#[test]
fn schedule_is_lazy_until_waited() {
    let ran = Arc::new(AtomicBool::new(false));
    let future = {
        let ran = ran.clone();
        schedule(move || {
            ran.store(true, Ordering::Release);
            9
        })
    };

    std::thread::sleep(Duration::from_millis(20));
    assert!(!ran.load(Ordering::Acquire));

    assert_eq!(future.get(), Ok(9));
    assert!(ran.load(Ordering::Acquire));
}

#[test]
fn deferred_continuation_chains() {
    let future = schedule(|| 10).then(|x: i32| x + 1).then(|x: i32| x * 2);
    assert_eq!(future.get(), Ok(22));
}

#[test]
fn stoppable_then_shares_stop_source() {
    let parent = spawn_stoppable(|token| {
        while !token.stop_requested() {
            std::thread::sleep(Duration::from_millis(1));
        }
        1
    });

    // The child is stoppable too and controls the same source.
    let child = parent.then(|x: i32| x + 1);
    std::thread::sleep(Duration::from_millis(10));
    assert!(child.request_stop());
    assert_eq!(child.get(), Ok(2));
}

#[test]
fn then_stop_uses_fresh_source() {
    let child = spawn(|| 1).then_stop(|token: StopToken, x: i32| {
        // The fresh source has not been stopped.
        assert!(!token.stop_requested());
        x + 1
    });
    assert_eq!(child.get(), Ok(2));
}

#[test]
fn dropped_stop_source_copy_still_cancels() {
    let parent = spawn_stoppable(|token| {
        while !token.stop_requested() {
            std::thread::sleep(Duration::from_millis(1));
        }
        5
    });

    // Keep a source copy, then move the future into a continuation. The
    // copy still controls the task.
    let source = parent.stop_source().unwrap();
    let child = parent.then(|x: i32| x);

    std::thread::sleep(Duration::from_millis(10));
    assert!(source.request_stop());
    assert_eq!(child.get(), Ok(5));
}

#[test]
fn shared_stoppable_cancel_from_any_holder() {
    let shared = spawn_stoppable(|token| {
        while !token.stop_requested() {
            std::thread::sleep(Duration::from_millis(1));
        }
        8
    })
    .share();

    let clone = shared.clone();
    std::thread::sleep(Duration::from_millis(5));
    assert!(clone.request_stop());

    assert_eq!(shared.get(), Ok(8));
    assert_eq!(clone.get(), Ok(8));
}

#[test]
fn detached_future_does_not_join() {
    let (tx, rx) = mpsc::channel();
    let mut future = spawn(move || {
        rx.recv().ok();
        1
    });

    future.detach();
    let start = Instant::now();
    drop(future);
    assert!(start.elapsed() < Duration::from_millis(100));

    tx.send(()).unwrap();
}

#[test]
fn join_at_drop_blocks_until_ready() {
    let done = Arc::new(AtomicBool::new(false));
    let future = {
        let done = done.clone();
        spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            done.store(true, Ordering::Release);
        })
    };

    drop(future);
    assert!(done.load(Ordering::Acquire));
}

#[test]
fn continuations_run_in_insertion_order() {
    // A single-threaded pool makes the post order observable.
    let pool = ThreadPool::new(1);
    let handle = pool.handle();

    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let parent = spawn_on(&handle, move || {
        gate_rx.recv().ok();
        0
    })
    .share();

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut children = Vec::new();
    for i in 1..=4 {
        let order = order.clone();
        children.push(parent.clone().then_on(&handle, move |_: i32| {
            order.lock().unwrap().push(i);
        }));
    }

    gate_tx.send(()).unwrap();
    for child in children {
        child.get().unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn await_interop() {
    let future = spawn(|| 13);
    assert_eq!(futures_lite::future::block_on(future), Ok(13));
}

#[test]
fn await_interop_deferred() {
    let future = schedule(|| 4);
    assert_eq!(futures_lite::future::block_on(future), Ok(4));
}

#[test]
fn operator_then() {
    let future = spawn(|| 3) >> (|x: i32| x + 1);
    assert_eq!(future.get(), Ok(4));
}

#[test]
fn operator_then_with_executor() {
    let pool = ThreadPool::new(1);
    let handle = pool.handle();

    let future = spawn(|| 3) % &handle >> (|x: i32| x * 3);
    assert_eq!(future.get(), Ok(9));
}
