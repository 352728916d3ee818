//! Report data shared by the output formats.

use std::collections::BTreeMap;

use surge_core::surge_metrics::{MetricValue, MetricsSnapshot, SeriesData, TrendSummary};
use surge_core::{
    CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS, ITERATIONS,
    RunOutcome, RunReport,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Totals {
    pub requests: u64,
    pub failed_requests: u64,
    pub iterations: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CheckLine {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EndpointLine {
    pub endpoint: String,
    pub requests: u64,
    pub failed: u64,
    pub p95_ms: Option<f64>,
}

pub(crate) fn outcome_label(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Cancelled => "cancelled",
        RunOutcome::AbortedByThreshold { .. } => "aborted_by_threshold",
        RunOutcome::Degraded { .. } => "degraded",
    }
}

fn rate_parts(data: Option<SeriesData>) -> (u64, u64) {
    match data {
        Some(SeriesData::Rate { total, hits }) => (total, hits),
        _ => (0, 0),
    }
}

pub(crate) fn totals(snapshot: &MetricsSnapshot) -> Totals {
    let (_, failed_requests) = rate_parts(snapshot.aggregate(HTTP_REQ_FAILED, &[]));
    Totals {
        requests: snapshot.counter(HTTP_REQS),
        failed_requests,
        iterations: snapshot.counter(ITERATIONS),
        bytes_received: snapshot.counter(DATA_RECEIVED),
        bytes_sent: snapshot.counter(DATA_SENT),
    }
}

pub(crate) fn latency(snapshot: &MetricsSnapshot) -> Option<TrendSummary> {
    match snapshot.aggregate(HTTP_REQ_DURATION, &[])?.value() {
        MetricValue::Trend(t) if t.count > 0 => Some(t),
        _ => None,
    }
}

/// Pass/fail counts per named check, sorted by name.
pub(crate) fn checks(snapshot: &MetricsSnapshot) -> Vec<CheckLine> {
    let mut by_name: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for series in snapshot.series(CHECKS) {
        let Some(name) = series.tag("check") else {
            continue;
        };
        let (total, hits) = rate_parts(Some(series.data.clone()));
        let entry = by_name.entry(name.to_string()).or_default();
        entry.0 = entry.0.saturating_add(hits);
        entry.1 = entry.1.saturating_add(total.saturating_sub(hits));
    }
    by_name
        .into_iter()
        .map(|(name, (passes, fails))| CheckLine {
            name,
            passes,
            fails,
        })
        .collect()
}

/// Request count, failures and p95 latency per `endpoint` tag, sorted by endpoint.
pub(crate) fn endpoints(snapshot: &MetricsSnapshot) -> Vec<EndpointLine> {
    let mut names: Vec<String> = snapshot
        .series(HTTP_REQS)
        .iter()
        .filter_map(|s| s.tag("endpoint").map(str::to_string))
        .collect();
    names.sort();
    names.dedup();

    names
        .into_iter()
        .map(|endpoint| {
            let selector = [("endpoint".to_string(), endpoint.clone())];
            let requests = match snapshot.aggregate(HTTP_REQS, &selector) {
                Some(SeriesData::Counter(n)) => n,
                _ => 0,
            };
            let (_, failed) = rate_parts(snapshot.aggregate(HTTP_REQ_FAILED, &selector));
            let p95_ms = snapshot
                .aggregate(HTTP_REQ_DURATION, &selector)
                .and_then(|d| d.quantile(0.95));
            EndpointLine {
                endpoint,
                requests,
                failed,
                p95_ms,
            }
        })
        .collect()
}

pub(crate) fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use surge_core::surge_metrics::{Observation, Registry};
    use surge_core::{SlotStats, ThresholdSet, evaluate, register_builtin_metrics};

    pub(crate) fn sample_report() -> RunReport {
        let reg = Arc::new(Registry::default());
        register_builtin_metrics(&reg).unwrap_or_else(|e| panic!("{e}"));

        let requests = [
            ("/data", "200", 12.0),
            ("/data", "500", 30.0),
            ("/job", "200", 4.0),
        ];
        for (endpoint, status, ms) in requests {
            let tags = [("method", "GET"), ("endpoint", endpoint), ("status", status)];
            assert!(reg.record(&Observation::new(HTTP_REQS, 1.0).tags(tags)));
            assert!(reg.record(&Observation::new(HTTP_REQ_DURATION, ms).tags(tags)));
            assert!(reg.record(
                &Observation::flag(HTTP_REQ_FAILED, status != "200").tag("endpoint", endpoint)
            ));
            assert!(reg.record(
                &Observation::flag(CHECKS, status == "200").tag("check", "status is 200")
            ));
            assert!(reg.record(&Observation::new(ITERATIONS, 1.0)));
            assert!(reg.record(&Observation::new(DATA_SENT, 50.0)));
            assert!(reg.record(&Observation::new(DATA_RECEIVED, 150.0)));
        }

        let thresholds = vec![ThresholdSet::new(HTTP_REQ_FAILED, ["rate<0.01"])];
        RunReport {
            outcome: RunOutcome::Completed,
            result: evaluate(&thresholds, reg.snapshot()),
            slots: SlotStats {
                spawned: 3,
                completed: 3,
                peak: 3,
                ..SlotStats::default()
            },
            elapsed: Duration::from_secs(2),
            dropped_observations: 0,
        }
    }

    #[test]
    fn derives_totals_checks_and_endpoints() {
        let report = sample_report();
        let snap = &report.result.snapshot;

        assert_eq!(
            totals(snap),
            Totals {
                requests: 3,
                failed_requests: 1,
                iterations: 3,
                bytes_received: 450,
                bytes_sent: 150,
            }
        );

        assert_eq!(
            checks(snap),
            vec![CheckLine {
                name: "status is 200".to_string(),
                passes: 2,
                fails: 1,
            }]
        );

        let eps = endpoints(snap);
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].endpoint, "/data");
        assert_eq!((eps[0].requests, eps[0].failed), (2, 1));
        assert_eq!((eps[1].requests, eps[1].failed), (1, 0));

        let lat = latency(snap).unwrap_or_else(|| panic!("latency"));
        assert_eq!(lat.count, 3);
    }
}
