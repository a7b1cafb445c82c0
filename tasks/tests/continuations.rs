#![cfg(not(loom))]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tasks::{ready_future, spawn, when_all_iter, ContinuableFuture, Error};

#[test]
fn nullary_rule() {
    let future = spawn(|| ()).then(|| 5);
    assert_eq!(future.get(), Ok(5));
}

#[test]
fn direct_rule() {
    let future = spawn(|| 20).then(|x: i32| x + 2);
    assert_eq!(future.get(), Ok(22));
}

#[test]
fn tuple_explode_via_destructuring() {
    let future = spawn(|| (2, 3)).then(|(a, b): (i32, i32)| a * b);
    assert_eq!(future.get(), Ok(6));
}

#[test]
fn double_unwrap_rule() {
    let future = spawn(|| spawn(|| 7)).then(|x: i32| x + 1);
    assert_eq!(future.get(), Ok(8));
}

#[test]
fn vector_unwrap_rule() {
    let futures: Vec<_> = (1..=4).map(|i| spawn(move || i)).collect();
    let future = when_all_iter(futures).then(|values: Vec<i32>| values.iter().sum::<i32>());
    assert_eq!(future.get(), Ok(10));
}

#[test]
fn continuation_on_ready_parent_runs_through_executor() {
    let parent = spawn(|| 1);
    parent.wait().unwrap();

    let ran_inline = Arc::new(AtomicBool::new(true));
    let flag = ran_inline.clone();
    let thread = std::thread::current().id();

    let child = parent.then(move |x: i32| {
        // The continuation must not run on the attaching thread.
        flag.store(std::thread::current().id() == thread, Ordering::Release);
        x + 1
    });

    assert_eq!(child.get(), Ok(2));
    assert!(!ran_inline.load(Ordering::Acquire));
}

#[test]
fn ready_future_continuation() {
    let future = ready_future(4).then(|x: i32| x * 4);
    assert_eq!(future.get(), Ok(16));
}

#[test]
fn parent_panic_propagates_through_chain() {
    let future = spawn(|| -> i32 { panic!("first") })
        .then(|x: i32| x + 1)
        .then(|x: i32| x + 1);

    assert_eq!(future.get(), Err(Error::Panicked("first".to_owned())));
}

#[test]
fn continuation_panic_is_captured() {
    let future = spawn(|| 1).then(|_: i32| -> i32 { panic!("second") });
    assert_eq!(future.get(), Err(Error::Panicked("second".to_owned())));
}

#[test]
fn continuation_on_plain_future_polls() {
    // Promise-backed futures have no continuation list; `then` falls
    // back to a polling wrapper on the executor.
    let mut promise = tasks::Promise::new();
    let parent = promise.future().unwrap();

    let child = parent.then(|x: i32| x * 10);
    promise.set_value(3).unwrap();
    assert_eq!(child.get(), Ok(30));
}

#[test]
fn long_chain() {
    let mut future: ContinuableFuture<u64> = spawn(|| 0_u64);
    for _ in 0..32 {
        future = future.then(|x: u64| x + 1);
    }
    assert_eq!(future.get(), Ok(32));
}

#[test]
fn chain_keeps_values_of_different_types() {
    let future = spawn(|| 21)
        .then(|x: i32| format!("{}", x * 2))
        .then(|s: String| s.len());
    assert_eq!(future.get(), Ok(2));
}

#[test]
fn shared_parent_feeds_many_children() {
    let parent = spawn(|| 10).share();

    let a = parent.clone().then(|x: i32| x + 1);
    let b = parent.clone().then(|x: i32| x + 2);
    let c = parent.then(|x: i32| x + 3);

    assert_eq!(a.get(), Ok(11));
    assert_eq!(b.get(), Ok(12));
    assert_eq!(c.get(), Ok(13));
}
