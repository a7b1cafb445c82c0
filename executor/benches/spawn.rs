use std::sync::mpsc;

use criterion::{criterion_group, criterion_main, Criterion};
use executor::{Executor, ThreadPool};

fn spawn(c: &mut Criterion) {
    let pool = ThreadPool::new(4);
    let handle = pool.handle();

    c.bench_function("post", |b| {
        b.iter(|| {
            let (tx, rx) = mpsc::channel();
            handle.post(Box::new(move || {
                tx.send(()).ok();
            }));
            rx.recv().unwrap();
        });
    });

    c.bench_function("post_batch_64", |b| {
        b.iter(|| {
            let (tx, rx) = mpsc::channel();
            for _ in 0..64 {
                let tx = tx.clone();
                handle.post(Box::new(move || {
                    tx.send(()).ok();
                }));
            }
            drop(tx);
            while rx.recv().is_ok() {}
        });
    });
}

criterion_group!(benches, spawn);
criterion_main!(benches);
