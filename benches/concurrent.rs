use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rayon::prelude::*;

use grouptable::ConcurrentMap;

const TOTAL_KEYS: u64 = 100_000;

fn parallel_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_insert");
    group.throughput(Throughput::Elements(TOTAL_KEYS));
    group.sample_size(10);

    for threads in [1usize, 4, num_cpus::get()] {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        group.bench_function(BenchmarkId::from_parameter(threads), |b| {
            b.iter(|| {
                let map: ConcurrentMap<u64, u64> = ConcurrentMap::with_capacity(16);
                pool.install(|| {
                    (0..TOTAL_KEYS).into_par_iter().for_each(|i| {
                        map.insert(i, i);
                    });
                });
                map
            });
        });
    }
    group.finish();
}

fn parallel_visit(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_visit");
    group.throughput(Throughput::Elements(TOTAL_KEYS));
    group.sample_size(10);

    let map: ConcurrentMap<u64, u64> = ConcurrentMap::with_capacity(TOTAL_KEYS as usize);
    for i in 0..TOTAL_KEYS {
        map.insert(i, i);
    }

    for threads in [1usize, 4, num_cpus::get()] {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        group.bench_function(BenchmarkId::from_parameter(threads), |b| {
            b.iter(|| {
                pool.install(|| {
                    (0..TOTAL_KEYS).into_par_iter().for_each(|i| {
                        map.visit(&i, |v| {
                            assert_eq!(*v, i);
                        });
                    });
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, parallel_insert, parallel_visit);
criterion_main!(benches);
