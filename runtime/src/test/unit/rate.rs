use std::time::{Duration, Instant};

use crate::RateSynchronizer;

#[test]
fn test_converges_to_rate() {
    let mut pacing = RateSynchronizer::new(200.0);
    assert_eq!(pacing.period(), Some(Duration::from_millis(5)));

    let started = Instant::now();
    for _ in 0..20 {
        pacing.start();
        std::thread::sleep(Duration::from_millis(1));
        pacing.finish();
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "finished early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(180), "overshot: {elapsed:?}");
}

#[test]
fn test_slow_work_adds_no_delay() {
    let mut pacing = RateSynchronizer::new(1000.0);
    for _ in 0..3 {
        pacing.start();
        std::thread::sleep(Duration::from_millis(3));
        assert_eq!(pacing.finish(), Duration::ZERO);
    }
}

#[test]
fn test_unconstrained_never_sleeps() {
    for rate in [0.0, -5.0, f64::INFINITY] {
        let mut pacing = RateSynchronizer::new(rate);
        assert_eq!(pacing.period(), None);
        pacing.start();
        assert_eq!(pacing.finish(), Duration::ZERO);
    }
}

#[test]
fn test_finish_without_start() {
    let mut pacing = RateSynchronizer::new(10.0);
    let started = Instant::now();
    assert_eq!(pacing.finish(), Duration::ZERO);
    assert!(started.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_work_outside_window_counts_toward_budget() {
    let mut pacing = RateSynchronizer::new(100.0);
    let started = Instant::now();
    for _ in 0..10 {
        pacing.start();
        pacing.finish();
        std::thread::sleep(Duration::from_millis(5));
    }
    let elapsed = started.elapsed();
    // ten 10 ms windows, the last one's trailing work included
    assert!(elapsed >= Duration::from_millis(95), "finished early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(135), "downstream work added to period: {elapsed:?}");
}

#[test]
fn test_reset_restarts_schedule() {
    let mut pacing = RateSynchronizer::new(50.0);
    pacing.start();
    pacing.reset();
    assert_eq!(pacing.finish(), Duration::ZERO);

    pacing.start();
    assert!(pacing.finish() > Duration::from_millis(10));
}
