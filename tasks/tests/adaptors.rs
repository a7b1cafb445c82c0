#![cfg(not(loom))]

use std::time::{Duration, Instant};

use tasks::{
    spawn, spawn_on, when_all, when_all_iter, when_any, when_any_iter, ContinuableFuture, Promise,
    ThreadPool, WaitStatus,
};

#[test]
fn when_all_tuple_unwrap() {
    let a = spawn(|| 1);
    let b = spawn(|| 2.5);
    let c = spawn(|| String::from("name"));

    let future = when_all((a, b, c)).then(|a: i32, b: f64, c: String| {
        (a as f64 + b) as i32 + c.len() as i32
    });

    assert_eq!(future.get(), Ok(7));
}

#[test]
fn when_all_returns_ready_futures() {
    let all = when_all((spawn(|| 1), spawn(|| 2)));
    let (a, b) = all.get().unwrap();

    assert!(a.is_ready());
    assert!(b.is_ready());
    assert_eq!(a.get(), Ok(1));
    assert_eq!(b.get(), Ok(2));
}

#[test]
fn when_all_over_vec() {
    let futures: Vec<_> = (0..8).map(|i| spawn(move || i)).collect();
    let all = when_all_iter(futures);

    all.wait().unwrap();
    let leaves = all.get().unwrap();
    assert_eq!(leaves.len(), 8);
}

#[test]
fn empty_when_all_is_ready() {
    let all = when_all(());
    assert!(all.is_ready());
    assert!(all.valid());
    all.get().unwrap();
}

#[test]
fn empty_when_any_has_sentinel_index() {
    let any = when_any(());
    assert!(any.is_ready());

    let result = any.get().unwrap();
    assert_eq!(result.index, None);
}

#[test]
fn one_element_when_any_delegates() {
    let any = when_any((spawn(|| 3),));
    let result = any.get().unwrap();

    assert_eq!(result.index, Some(0));
    let (leaf,) = result.tasks;
    assert_eq!(leaf.get(), Ok(3));
}

#[test]
fn when_any_heterogeneous_durations() {
    let pool = ThreadPool::new(2);
    let handle = pool.handle();

    let slow = spawn_on(&handle, || {
        std::thread::sleep(Duration::from_millis(50));
        1
    });
    let fast = spawn_on(&handle, || {
        std::thread::sleep(Duration::from_millis(1));
        2
    });

    let result = when_any((slow, fast)).get().unwrap();
    assert_eq!(result.index, Some(1));
    assert_eq!(result.tasks.1.get(), Ok(2));
}

#[test]
fn when_any_returns_within_bounded_delay() {
    let pool = ThreadPool::new(2);
    let handle = pool.handle();

    let slow = spawn_on(&handle, || {
        std::thread::sleep(Duration::from_secs(2));
        1
    });
    let fast = spawn_on(&handle, || {
        std::thread::sleep(Duration::from_millis(5));
        2
    });

    let start = Instant::now();
    let mut any = when_any((slow, fast));
    any.wait().unwrap();

    // The slow leaf runs for two seconds; the wait must return once the
    // fast leaf is done, not when both are.
    assert!(start.elapsed() < Duration::from_secs(1));

    let result = any.get().unwrap();
    assert_eq!(result.index, Some(1));
}

#[test]
fn when_any_over_plain_futures_polls() {
    // Promise-backed leaves have no continuation lists, so the proxy has
    // to discover completion by polling.
    let mut promise_a = Promise::<u32>::new();
    let mut promise_b = Promise::<u32>::new();
    let a = promise_a.future().unwrap();
    let b = promise_b.future().unwrap();

    let setter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        promise_b.set_value(9).unwrap();
        // Keep the other promise alive past the wait, then resolve it.
        std::thread::sleep(Duration::from_millis(50));
        promise_a.set_value(1).unwrap();
    });

    let result = when_any((a, b)).get().unwrap();
    assert_eq!(result.index, Some(1));
    assert_eq!(result.tasks.1.get(), Ok(9));

    setter.join().unwrap();
}

#[test]
fn when_any_wait_for_times_out() {
    let mut promise_a = Promise::<u32>::new();
    let mut promise_b = Promise::<u32>::new();
    let a = promise_a.future().unwrap();
    let b = promise_b.future().unwrap();

    let mut any = when_any((a, b));
    assert_eq!(
        any.wait_for(Duration::from_millis(20)).unwrap(),
        WaitStatus::Timeout
    );

    promise_a.set_value(1).unwrap();
    promise_b.set_value(2).unwrap();
    assert_eq!(
        any.wait_for(Duration::from_millis(100)).unwrap(),
        WaitStatus::Ready
    );

    let result = any.get().unwrap();
    assert_eq!(result.index, Some(0));
}

#[test]
fn when_any_select_value() {
    let futures: Vec<_> = vec![
        spawn(|| {
            std::thread::sleep(Duration::from_millis(30));
            1
        }),
        spawn(|| 2),
    ];

    let future = when_any_iter(futures).then(|value: i32| value * 10);
    assert_eq!(future.get(), Ok(20));
}

#[test]
fn when_any_select_future() {
    let futures: Vec<_> = vec![spawn(|| 4)];

    let future = when_any_iter(futures).then(|chosen: ContinuableFuture<i32>| {
        chosen.get().unwrap_or_default()
    });
    assert_eq!(future.get(), Ok(4));
}

#[test]
fn when_any_split_continuation() {
    let any = when_any((spawn(|| 1), spawn(|| 2)));

    let future = any.then(
        |index: Option<usize>, tasks: (ContinuableFuture<i32>, ContinuableFuture<i32>)| {
            assert!(index.is_some());
            let (a, b) = tasks;
            a.get().unwrap_or_default() + b.get().unwrap_or_default()
        },
    );
    assert_eq!(future.get(), Ok(3));
}

#[test]
fn operator_disjunction_flattens() {
    let a = spawn(|| 1_i32);
    let b = spawn(|| 2_i32);
    let c = spawn(|| 3_i32);

    // (a | b) | c is a three-way disjunction, not a nested one: the
    // index ranges over all three leaves.
    let result = ((a | b) | c).get().unwrap();
    assert!(result.index.is_some_and(|index| index < 3));
}

#[test]
fn operator_conjunction_flattens() {
    let a = spawn(|| 1);
    let b = spawn(|| 2);
    let c = spawn(|| 3);

    let future = ((a & b) & c).then(|x: i32, y: i32, z: i32| x + y + z);
    assert_eq!(future.get(), Ok(6));
}

#[test]
fn merged_vec_disjunctions_concatenate() {
    let first = when_any_iter((0..2).map(|i| spawn(move || i)));
    let second = when_any_iter((2..4).map(|i| spawn(move || i)));

    let merged = first | second;
    let result = merged.get().unwrap();
    assert_eq!(result.tasks.len(), 4);
    assert!(result.index.is_some_and(|index| index < 4));
}

#[test]
fn conjunction_of_disjunctions() {
    let any_a = when_any((spawn(|| 1), spawn(|| 2)));
    let any_b = when_any((spawn(|| 3), spawn(|| 4)));

    let all = any_a & any_b;
    let (left, right) = all.get().unwrap();
    assert!(left.is_ready());
    assert!(right.is_ready());
}

#[test]
fn proxy_leaf_inside_when_any() {
    // A wait-all proxy has no single operation state to observe; the
    // disjunction falls back to busy polling for it.
    let all = when_all((spawn(|| 1), spawn(|| 2)));
    let lone = spawn(|| 3);

    let result = when_any((all, lone)).get().unwrap();
    assert!(result.index.is_some());
}

#[test]
fn when_all_wait_until_deadline() {
    let mut promise = Promise::<u32>::new();
    let pending = promise.future().unwrap();
    let done = spawn(|| 1);

    let all = when_all((done, pending));
    assert_eq!(
        all.wait_for(Duration::from_millis(20)).unwrap(),
        WaitStatus::Timeout
    );

    promise.set_value(2).unwrap();
    assert_eq!(
        all.wait_for(Duration::from_millis(100)).unwrap(),
        WaitStatus::Ready
    );

    let (a, b) = all.get().unwrap();
    assert_eq!(a.get(), Ok(1));
    assert_eq!(b.get(), Ok(2));
}

#[test]
fn release_moves_leaves_out() {
    let any = when_any((spawn(|| 1), spawn(|| 2)));
    let (a, b) = any.release().unwrap();

    assert_eq!(a.get(), Ok(1));
    assert_eq!(b.get(), Ok(2));
}
