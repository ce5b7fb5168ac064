//! Throughput benchmark using criterion.
//!
//! Measures how fast the scheduler drains large batches of tiny jobs,
//! plain and chunked.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use jobsys::JobSystem;

const JOB_COUNT: usize = 100_000;

fn warm_up(system: &JobSystem) {
    for _ in 0..100 {
        let counter = system.submit_batch(vec![|| {}]).unwrap();
        system.wait_for_counter(counter.as_ref());
    }
}

/// One job per closure through the shared queue.
fn bench_submit_batch(c: &mut Criterion) {
    let num_threads = num_cpus::get();
    let system = JobSystem::new();
    system.initialize(num_threads).unwrap();
    warm_up(&system);

    let mut group = c.benchmark_group("throughput");
    group.throughput(Throughput::Elements(JOB_COUNT as u64));
    group.sample_size(10);

    group.bench_function(BenchmarkId::new("submit_batch", num_threads), |b| {
        b.iter(|| {
            let jobs: Vec<_> = (0..JOB_COUNT)
                .map(|_| || {
                    std::hint::black_box(1 + 1);
                })
                .collect();
            let counter = system.submit_batch(jobs).unwrap();
            system.wait_for_counter(counter.as_ref());
        })
    });

    group.finish();
    system.shutdown();
}

/// Chunking amortizes queue traffic across many tiny jobs.
fn bench_chunk_sizes(c: &mut Criterion) {
    let system = JobSystem::new();
    system.initialize(num_cpus::get()).unwrap();
    warm_up(&system);

    let mut group = c.benchmark_group("throughput_chunked");
    group.throughput(Throughput::Elements(JOB_COUNT as u64));
    group.sample_size(10);

    // 0 = automatic chunk size.
    for chunk_size in [0, 1, 16, 64, 256] {
        group.bench_function(BenchmarkId::new("chunk", chunk_size), |b| {
            b.iter(|| {
                let jobs: Vec<_> = (0..JOB_COUNT)
                    .map(|_| || {
                        std::hint::black_box(1 + 1);
                    })
                    .collect();
                let counter = system.submit_batch_chunked(jobs, chunk_size).unwrap();
                system.wait_for_counter(counter.as_ref());
            })
        });
    }

    group.finish();
    system.shutdown();
}

/// Scaling across thread counts.
fn bench_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput_scaling");
    group.throughput(Throughput::Elements(JOB_COUNT as u64));
    group.sample_size(10);

    for threads in [1, 2, 4, 8, 16, 32]
        .into_iter()
        .filter(|&t| t <= num_cpus::get())
    {
        let system = JobSystem::new();
        system.initialize(threads).unwrap();
        warm_up(&system);

        group.bench_function(BenchmarkId::new("chunked_auto", threads), |b| {
            b.iter(|| {
                let jobs: Vec<_> = (0..JOB_COUNT)
                    .map(|_| || {
                        std::hint::black_box(1 + 1);
                    })
                    .collect();
                let counter = system.submit_batch_chunked(jobs, 0).unwrap();
                system.wait_for_counter(counter.as_ref());
            })
        });

        system.shutdown();
    }

    group.finish();
}

criterion_group!(benches, bench_submit_batch, bench_chunk_sizes, bench_scaling);
criterion_main!(benches);
