mod common;

use std::sync::Arc;
use std::time::Duration;

use surge_core::surge_metrics::{Registry, SeriesData};
use surge_core::{
    CHECKS, Error, FailureReason, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS, ITERATIONS,
    RunConfig, RunOutcome, Scheduler, ThinkTime, ThresholdSet, VUS, VUS_MAX,
};
use tokio_util::sync::CancellationToken;

use common::{
    CountingWork, MockTransport, assert_slot_accounting, http_work, run, scheduler, secs, stages,
};

fn rate(report: &surge_core::RunReport, name: &str, selector: &[(String, String)]) -> (u64, u64) {
    match report.result.snapshot.aggregate(name, selector) {
        Some(SeriesData::Rate { total, hits }) => (total, hits),
        other => panic!("expected rate data for {name}, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn ramp_with_fast_responses_passes_latency_threshold() {
    let mut config = RunConfig::new(stages(&[(30, 200), (30, 1000)]));
    config.think_time = Some(ThinkTime::fixed(secs(1)));
    config.thresholds = vec![
        ThresholdSet::new(HTTP_REQ_DURATION, ["p(95)<2000"]),
        ThresholdSet::new(HTTP_REQ_FAILED, ["rate<0.01"]),
    ];
    let sched = scheduler(config);
    let transport = Arc::new(MockTransport::new(Duration::from_millis(100)));

    let report = run(&sched, http_work(transport.clone())).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(
        report.result.passed,
        "failed: {:?}",
        report.result.failed_thresholds
    );
    assert_eq!(report.result.thresholds.len(), 2);
    assert!((990..=1000).contains(&report.slots.peak), "{:?}", report.slots);
    assert_eq!(report.slots.abandoned, 0);
    assert_slot_accounting(&report);

    let snap = &report.result.snapshot;
    assert_eq!(snap.counter(ITERATIONS), snap.counter(HTTP_REQS));
    assert_eq!(snap.counter(HTTP_REQS), transport.calls());
    assert_eq!(snap.gauge(VUS), Some(0));
    assert_eq!(snap.gauge(VUS_MAX), Some(report.slots.peak as i64));
    assert!(report.elapsed >= secs(60));
    assert!(report.elapsed < secs(61));
}

#[tokio::test(start_paused = true)]
async fn half_failing_target_fails_error_rate_threshold() {
    let mut config = RunConfig::new(stages(&[(10, 100)]));
    config.start_vus = 100;
    config.think_time = Some(ThinkTime::fixed(Duration::from_millis(500)));
    config.thresholds = vec![
        ThresholdSet::new(HTTP_REQ_DURATION, ["p(95)<2000"]),
        ThresholdSet::new(HTTP_REQ_FAILED, ["rate<0.01"]),
    ];
    let sched = scheduler(config);
    let transport = Arc::new(MockTransport::half_failing(Duration::from_millis(50)));

    let report = run(&sched, http_work(transport)).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(!report.result.passed);
    assert_eq!(report.result.failed_thresholds.len(), 1);
    let failure = &report.result.failed_thresholds[0];
    assert_eq!(failure.metric, HTTP_REQ_FAILED);
    assert_eq!(failure.expression, "rate<0.01");
    assert_eq!(failure.reason, FailureReason::Violated);

    let observed = failure.observed.unwrap_or_else(|| panic!("observed rate"));
    assert!((observed - 0.5).abs() < 0.01, "observed {observed}");

    let (total, hits) = rate(&report, HTTP_REQ_FAILED, &[]);
    assert_eq!(total, report.result.snapshot.counter(HTTP_REQS));
    assert!(hits.abs_diff(total / 2) <= 1);

    let status_check = [("check".to_string(), "status is 200".to_string())];
    let (checks_total, checks_passed) = rate(&report, CHECKS, &status_check);
    assert_eq!(checks_total, total);
    assert_eq!(checks_passed, total - hits);
}

#[tokio::test(start_paused = true)]
async fn abort_on_fail_stops_the_run_early() {
    let mut config = RunConfig::new(stages(&[(60, 20)]));
    config.start_vus = 20;
    config.thresholds =
        vec![ThresholdSet::new(HTTP_REQ_FAILED, ["rate<0.01"]).with_abort_on_fail(true)];
    let sched = scheduler(config);
    let transport = Arc::new(MockTransport::half_failing(Duration::from_millis(100)));

    let report = run(&sched, http_work(transport)).await;

    assert_eq!(
        report.outcome,
        RunOutcome::AbortedByThreshold {
            metric: HTTP_REQ_FAILED.to_string(),
            expression: "rate<0.01".to_string(),
        }
    );
    assert!(report.elapsed < secs(5), "elapsed {:?}", report.elapsed);
    assert!(!report.result.passed);
    assert_slot_accounting(&report);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_ramp_finishes_in_flight_iterations() {
    let mut config = RunConfig::new(stages(&[(60, 100)]));
    config.graceful_stop = secs(5);
    let sched = scheduler(config);
    let transport = Arc::new(MockTransport::new(Duration::from_millis(500)));
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(secs(10)).await;
        stopper.cancel();
    });

    let report = sched
        .start(http_work(transport.clone()), cancel)
        .await
        .unwrap_or_else(|e| panic!("run: {e}"));

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(report.elapsed >= secs(10));
    assert!(report.elapsed <= secs(11), "elapsed {:?}", report.elapsed);
    assert_eq!(report.slots.abandoned, 0);
    assert!(report.slots.spawned > 0 && report.slots.spawned < 100);
    assert_slot_accounting(&report);

    let snap = &report.result.snapshot;
    assert_eq!(snap.counter(ITERATIONS), snap.counter(HTTP_REQS));
    assert_eq!(snap.counter(HTTP_REQS), transport.calls());
    assert_eq!(snap.gauge(VUS), Some(0));
}

#[tokio::test(start_paused = true)]
async fn stuck_slots_are_abandoned_after_graceful_stop() {
    let mut config = RunConfig::new(stages(&[(5, 10)]));
    config.start_vus = 10;
    config.graceful_stop = secs(1);
    let sched = scheduler(config);
    let work = Arc::new(CountingWork::hanging());

    let report = run(&sched, work.clone()).await;

    assert_eq!(
        report.outcome,
        RunOutcome::Degraded {
            reason: "10 slots abandoned after graceful stop".to_string()
        }
    );
    assert!(report.result.passed);
    assert_eq!(report.slots.spawned, 10);
    assert_eq!(report.slots.abandoned, 10);
    assert_eq!(report.slots.completed, 0);
    assert_slot_accounting(&report);
    assert_eq!(work.started(), 10);
    assert_eq!(report.result.snapshot.counter(ITERATIONS), 0);
    assert!(report.elapsed >= secs(6));
    assert!(report.elapsed < Duration::from_millis(6200));
}

#[tokio::test(start_paused = true)]
async fn unknown_threshold_metric_fails_before_any_work() {
    let mut config = RunConfig::new(stages(&[(10, 10)]));
    config.thresholds = vec![ThresholdSet::new("no_such_metric", ["count>0"])];
    let sched = scheduler(config);
    let work = Arc::new(CountingWork::new(Duration::from_millis(10)));

    let err = sched
        .start(work.clone(), CancellationToken::new())
        .await
        .err()
        .unwrap_or_else(|| panic!("expected an error"));

    assert!(matches!(err, Error::UnknownThresholdMetric(ref m) if m == "no_such_metric"));
    assert_eq!(work.started(), 0);
}

#[tokio::test]
async fn invalid_config_is_rejected_on_construction() {
    let registry = Arc::new(Registry::default());

    let empty = Scheduler::new(RunConfig::new(Vec::new()), registry.clone());
    assert!(matches!(empty, Err(Error::NoStages)));

    let mut config = RunConfig::new(stages(&[(10, 10)]));
    config.thresholds = vec![ThresholdSet::new(HTTP_REQ_DURATION, ["p(95)<<2000"])];
    assert!(matches!(
        Scheduler::new(config, registry),
        Err(Error::InvalidThreshold { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn target_above_cap_is_clamped_and_degraded() {
    let mut config = RunConfig::new(stages(&[(5, 50)]));
    config.max_vus = Some(20);
    let sched = scheduler(config);
    let work = Arc::new(CountingWork::new(Duration::from_millis(100)));

    let report = run(&sched, work).await;

    assert!(
        matches!(report.outcome, RunOutcome::Degraded { .. }),
        "{:?}",
        report.outcome
    );
    assert_eq!(report.slots.peak, 20);
    assert_eq!(report.slots.spawned, 20);
    assert_slot_accounting(&report);
}

#[tokio::test(start_paused = true)]
async fn panicking_slot_is_replaced() {
    let mut config = RunConfig::new(stages(&[(3, 5)]));
    config.start_vus = 5;
    let sched = scheduler(config);
    let work = Arc::new(CountingWork::panicking_once(Duration::from_millis(100)));

    let report = run(&sched, work).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.slots.faulted, 1);
    assert_eq!(report.slots.spawned, 6);
    assert_eq!(report.slots.peak, 5);
    assert_slot_accounting(&report);
}

#[tokio::test(start_paused = true)]
async fn live_slots_follow_the_ramp() {
    let config = RunConfig::new(stages(&[(10, 100), (10, 0)]));
    let sched = Arc::new(scheduler(config));
    let work = Arc::new(CountingWork::new(Duration::from_millis(250)));
    let state = sched.state().clone();

    let t0 = tokio::time::Instant::now();
    let handle = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.start(work, CancellationToken::new()).await })
    };

    for (at_ms, expected) in [(5_050, 50), (10_050, 100), (15_050, 50)] {
        tokio::time::sleep_until(t0 + Duration::from_millis(at_ms)).await;
        let live = state.live();
        assert!(
            live.abs_diff(expected) <= 1,
            "at {at_ms}ms: live {live}, expected {expected}"
        );
        assert_eq!(state.target(), live);
    }

    let report = handle
        .await
        .unwrap_or_else(|e| panic!("join: {e}"))
        .unwrap_or_else(|e| panic!("run: {e}"));
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.slots.peak, 100);
    assert!((98..=100).contains(&report.slots.retired), "{:?}", report.slots);
    assert_eq!(state.live(), 0);
    assert_slot_accounting(&report);
}
