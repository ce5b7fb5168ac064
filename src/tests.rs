//! Integration tests for the job system.

use crate::logging::try_init_test_logging;
use crate::{JobCounter, JobSystem};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn started(threads: usize) -> JobSystem {
    try_init_test_logging();
    let job_system = JobSystem::new();
    job_system.initialize(threads).expect("initialize failed");
    job_system
}

#[test]
fn test_basic_job_execution() {
    let job_system = started(2);
    let value = Arc::new(AtomicUsize::new(0));
    let value_clone = value.clone();

    let counter = job_system
        .submit_batch(vec![move || {
            value_clone.store(42, Ordering::SeqCst);
        }])
        .unwrap();

    job_system.wait_for_counter(counter.as_ref());
    assert_eq!(value.load(Ordering::SeqCst), 42);
    job_system.shutdown();
}

#[test]
fn test_parallel_job_execution() {
    let job_system = started(4);
    let sum = Arc::new(AtomicUsize::new(0));

    let num_jobs = 100;
    let mut jobs: Vec<Box<dyn FnOnce() + Send>> = Vec::new();

    for i in 0..num_jobs {
        let sum_clone = sum.clone();
        jobs.push(Box::new(move || {
            sum_clone.fetch_add(i, Ordering::SeqCst);
        }));
    }

    let counter = job_system.submit_batch(jobs).unwrap();
    job_system.wait_for_counter(counter.as_ref());

    let expected_sum: usize = (0..num_jobs).sum();
    assert_eq!(sum.load(Ordering::SeqCst), expected_sum);
    job_system.shutdown();
}

#[test]
fn test_manual_counter_synchronization() {
    let job_system = started(4);
    let counter = JobCounter::new(10);

    for _ in 0..10 {
        let counter_clone = counter.clone();
        job_system
            .submit(move || {
                thread::sleep(Duration::from_millis(10));
                counter_clone.decrement();
            })
            .unwrap();
    }

    job_system.wait_for_counter(&counter);
    assert!(counter.is_complete());
    job_system.shutdown();
}

#[test]
fn test_high_throughput() {
    let job_system = started(8);
    let num_jobs = 1000;
    let mut jobs: Vec<Box<dyn FnOnce() + Send>> = Vec::new();

    for _ in 0..num_jobs {
        jobs.push(Box::new(|| {
            let mut sum = 0u64;
            for i in 0..100 {
                sum += i;
            }
            std::hint::black_box(sum);
        }));
    }

    let counter = job_system.submit_batch_chunked(jobs, 0).unwrap();
    job_system.wait_for_counter(counter.as_ref());

    assert!(counter.unwrap().is_complete());
    job_system.shutdown();
}

#[test]
fn test_nested_batches_on_single_worker() {
    // The only worker waits on a sub-batch it submitted itself; it must run
    // the sub-jobs while waiting instead of blocking.
    let job_system = started(1);
    let leaves = Arc::new(AtomicUsize::new(0));
    let done = JobCounter::new(1);

    let handle = job_system.clone();
    let leaves_clone = leaves.clone();
    let done_clone = done.clone();
    job_system
        .submit_to_worker(
            move || {
                let sub_jobs: Vec<_> = (0..8)
                    .map(|_| {
                        let leaves = leaves_clone.clone();
                        move || {
                            leaves.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                    .collect();
                let sub_counter = handle.submit_batch(sub_jobs).unwrap();
                handle.wait_for_counter(sub_counter.as_ref());
                done_clone.decrement();
            },
            0,
        )
        .unwrap();

    // Poll without helping so the worker has to drain the sub-batch alone.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !done.is_complete() {
        assert!(std::time::Instant::now() < deadline, "nested batch deadlocked");
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(leaves.load(Ordering::SeqCst), 8);
    job_system.shutdown();
}

#[test]
fn test_panicking_job_settles_batch() {
    let job_system = started(2);
    let survivors = Arc::new(AtomicUsize::new(0));

    let mut jobs: Vec<Box<dyn FnOnce() + Send>> = Vec::new();
    jobs.push(Box::new(|| panic!("Intentional panic for testing")));
    for _ in 0..4 {
        let survivors = survivors.clone();
        jobs.push(Box::new(move || {
            survivors.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let counter = job_system.submit_batch(jobs).unwrap();
    assert!(job_system.wait_for_counter_timeout(counter.as_ref(), Duration::from_secs(10)));
    assert_eq!(survivors.load(Ordering::SeqCst), 4);

    // Totals are bumped after the counter, so give the runner a moment.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while job_system.statistics().total_jobs_panicked == 0 {
        assert!(std::time::Instant::now() < deadline, "panic was not recorded");
        thread::sleep(Duration::from_millis(1));
    }
    job_system.shutdown();
}

#[test]
fn test_statistics_after_drain() {
    let job_system = started(2);
    let jobs: Vec<_> = (0..50).map(|_| || {}).collect();
    let counter = job_system.submit_batch(jobs).unwrap();
    job_system.wait_for_counter(counter.as_ref());
    job_system.shutdown();

    let stats = job_system.statistics();
    assert_eq!(stats.total_jobs_submitted, 50);
    assert_eq!(stats.total_jobs_completed, 50);
    assert_eq!(stats.pending_jobs(), 0);
    assert!(stats.jobs_per_worker.is_empty());
}

#[test]
fn test_independent_job_systems() {
    let first = started(2);
    let second = started(2);
    let seen = Arc::new(Mutex::new(Vec::new()));

    // A worker of one job system is not a worker of another.
    let jobs: Vec<_> = (0..8)
        .map(|_| {
            let seen = seen.clone();
            let other = second.clone();
            move || seen.lock().unwrap().push(other.current_worker_id())
        })
        .collect();
    let counter = first.submit_batch(jobs).unwrap();
    first.wait_for_counter(counter.as_ref());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 8);
    assert!(seen.iter().all(Option::is_none));

    first.shutdown();
    assert!(second.is_initialized());
    second.shutdown();
}
