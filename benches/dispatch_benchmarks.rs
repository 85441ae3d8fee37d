use criterion::{black_box, criterion_group, criterion_main, Criterion};
use turntable::execution::{partition, Dispatcher};

fn busy_square(x: u64) -> Result<u64, String> {
    let mut acc = x;
    for _ in 0..1_000 {
        acc = black_box(acc.wrapping_mul(31).wrapping_add(x));
    }
    Ok(acc.wrapping_add(x * x))
}

fn benchmark_partition(c: &mut Criterion) {
    c.bench_function("partition_100k_into_8", |b| {
        b.iter(|| partition(black_box((0..100_000_u64).collect::<Vec<_>>()), 8, None))
    });
}

fn benchmark_dispatch_modes(c: &mut Criterion) {
    let dispatcher = Dispatcher::new().processes(4).quiet(true).verbose(false);
    let items: Vec<u64> = (0..10_000).collect();

    let mut group = c.benchmark_group("dispatch_10k");
    group.bench_function("series", |b| {
        b.iter(|| dispatcher.series(items.clone(), busy_square))
    });
    group.bench_function("thread", |b| {
        b.iter(|| dispatcher.thread(items.clone(), busy_square))
    });
    group.bench_function("parallel", |b| {
        b.iter(|| dispatcher.parallel(items.clone(), busy_square))
    });
    group.bench_function("batch", |b| {
        b.iter(|| dispatcher.batch(items.clone(), busy_square))
    });
    group.finish();
}

criterion_group!(benches, benchmark_partition, benchmark_dispatch_modes);
criterion_main!(benches);
