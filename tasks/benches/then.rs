use criterion::{criterion_group, criterion_main, Criterion};
use tasks::{spawn_on, when_any_iter, ThreadPool};

fn continuations(c: &mut Criterion) {
    let pool = ThreadPool::new(4);
    let handle = pool.handle();

    c.bench_function("spawn_get", |b| {
        b.iter(|| {
            let future = spawn_on(&handle, || 1_u64);
            future.get().unwrap()
        });
    });

    c.bench_function("then_chain_8", |b| {
        b.iter(|| {
            let mut future = spawn_on(&handle, || 0_u64);
            for _ in 0..8 {
                future = future.then_on(&handle, |x: u64| x + 1);
            }
            future.get().unwrap()
        });
    });

    c.bench_function("when_any_4", |b| {
        b.iter(|| {
            let futures: Vec<_> = (0..4).map(|i| spawn_on(&handle, move || i)).collect();
            when_any_iter(futures).get().unwrap().index
        });
    });
}

criterion_group!(benches, continuations);
criterion_main!(benches);
