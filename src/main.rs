use anyhow::{Context, Result};
use jobsys::{JobSystem, JobSystemConfig, logging, parallel_for};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

lazy_static::lazy_static! {
    /// Application-wide scheduler. Library code takes a `&JobSystem` instead.
    static ref JOB_SYSTEM: JobSystem = JobSystem::with_config(load_config());
}

fn load_config() -> JobSystemConfig {
    match std::env::args().nth(1) {
        Some(path) => match JobSystemConfig::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "using default configuration");
                JobSystemConfig::default()
            }
        },
        None => JobSystemConfig::default(),
    }
}

fn main() -> Result<()> {
    logging::init_logging();
    println!("jobsys - work-stealing job scheduler\n");

    let job_system = &*JOB_SYSTEM;
    job_system
        .initialize(0)
        .context("failed to start worker threads")?;
    println!(
        "Initialized job system with {} worker threads\n",
        job_system.worker_count()
    );

    // Example 1: batch of independent jobs
    println!("Example 1: Parallel computation");
    let sum = Arc::new(AtomicUsize::new(0));
    let num_jobs = 100;

    let start = Instant::now();
    let jobs: Vec<_> = (0..num_jobs)
        .map(|i| {
            let sum_clone = sum.clone();
            move || {
                let mut local_sum = 0usize;
                for j in 0..1000 {
                    local_sum = local_sum.wrapping_add(j);
                }
                std::hint::black_box(local_sum);
                sum_clone.fetch_add(i, Ordering::Relaxed);
            }
        })
        .collect();

    let counter = job_system.submit_batch(jobs)?;
    job_system.wait_for_counter(counter.as_ref());

    let expected_sum: usize = (0..num_jobs).sum();
    println!("  Executed {} jobs in {:?}", num_jobs, start.elapsed());
    println!(
        "  Sum result: {} (expected: {})\n",
        sum.load(Ordering::Relaxed),
        expected_sum
    );

    // Example 2: many tiny jobs, chunked
    println!("Example 2: High-throughput chunked batch");
    let num_jobs = 10_000;
    let start = Instant::now();
    let jobs: Vec<_> = (0..num_jobs)
        .map(|_| {
            || {
                let mut x = 0u32;
                for i in 0..10 {
                    x += i;
                }
                std::hint::black_box(x);
            }
        })
        .collect();

    let counter = job_system.submit_batch_chunked(jobs, 0)?;
    job_system.wait_for_counter(counter.as_ref());

    let duration = start.elapsed();
    println!("  Executed {} jobs in {:?}", num_jobs, duration);
    println!(
        "  Throughput: {:.2} jobs/second\n",
        num_jobs as f64 / duration.as_secs_f64()
    );

    // Example 3: parallel_for over an index range
    println!("Example 3: parallel_for");
    let squares = Arc::new(AtomicUsize::new(0));
    let sink = squares.clone();
    parallel_for(Some(job_system), 0..1000, 0, move |i| {
        sink.fetch_add(i * i, Ordering::Relaxed);
    });
    println!("  Sum of squares below 1000: {}\n", squares.load(Ordering::Relaxed));

    let stats = job_system.statistics();
    println!(
        "Statistics:\n{}",
        toml::to_string_pretty(&stats).context("failed to render statistics")?
    );

    println!("Shutting down job system...");
    job_system.shutdown();
    println!("Done!");
    Ok(())
}
