use jobsys::{JobCounter, JobSystem};
use std::sync::mpsc;
use std::time::{Duration, Instant};

#[test]
fn test_wait_times_out_then_completes() {
    let job_system = JobSystem::new();
    job_system.initialize(2).unwrap();

    let (release_tx, release_rx) = mpsc::channel::<()>();
    let counter = JobCounter::new(1);
    let counter_clone = counter.clone();
    job_system
        .submit_to_worker(
            move || {
                let _ = release_rx.recv();
                counter_clone.decrement();
            },
            0,
        )
        .unwrap();

    let start = Instant::now();
    assert!(!job_system.wait_for_counter_timeout(&counter, Duration::from_millis(50)));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(5));

    // The abandoned wait left the job running; releasing it settles the counter.
    release_tx.send(()).unwrap();
    assert!(job_system.wait_for_counter_timeout(&counter, Duration::from_secs(10)));
    job_system.shutdown();
}

#[test]
fn test_completed_counter_returns_immediately() {
    let job_system = JobSystem::new();
    job_system.initialize(1).unwrap();

    let counter = JobCounter::new(0);
    assert!(job_system.wait_for_counter_timeout(&counter, Duration::ZERO));
    assert!(job_system.wait_for_counter_timeout(None, Duration::ZERO));
    job_system.shutdown();
}

#[test]
fn test_wait_on_uninitialized_system_returns() {
    let job_system = JobSystem::new();
    let counter = JobCounter::new(1);

    let start = Instant::now();
    assert!(!job_system.wait_for_counter_timeout(&counter, Duration::from_secs(10)));
    assert!(start.elapsed() < Duration::from_secs(5));
}
