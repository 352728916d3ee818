use std::time::Duration;

use surge_metrics::agg::{IntervalCounter, RunningStats};
use surge_metrics::{MetricValue, MetricsSnapshot, SeriesData};

use crate::builtin::{
    CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS, ITERATIONS,
};
use crate::schedule::StageSchedule;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
    /// Total requests observed so far.
    pub requests_total: u64,
    /// Requests counted in `http_req_failed` so far.
    pub failed_requests_total: u64,
    /// Failed requests / total requests during the last progress interval (0..=1).
    pub error_rate_now: f64,
    pub iterations_total: u64,
    pub iterations_per_sec_now: f64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
    pub bytes_received_per_sec_now: u64,
    pub bytes_sent_per_sec_now: u64,
    pub checks_failed_total: u64,

    /// Requests/sec statistics across progress intervals.
    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,

    /// Request latency over the whole run so far, in milliseconds.
    pub latency_mean_ms: Option<f64>,
    pub latency_p50_ms: Option<f64>,
    pub latency_p90_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

impl StageProgress {
    pub(crate) fn at(schedule: &StageSchedule, elapsed: Duration) -> Option<Self> {
        schedule.stage_snapshot_at(elapsed).map(|st| StageProgress {
            stage: st.index + 1,
            stages: st.count,
            stage_elapsed: st.stage_elapsed,
            stage_remaining: st.stage_remaining,
            start_target: st.start_target,
            end_target: st.end_target,
            current_target: st.current_target,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub interval: Duration,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub stage: Option<StageProgress>,
    /// Live (non-retiring) slots.
    pub vus: u64,
    pub vus_target: u64,
    pub vus_max: u64,
    pub metrics: LiveMetrics,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

fn rate_parts(snapshot: &MetricsSnapshot, name: &str) -> (u64, u64) {
    match snapshot.aggregate(name, &[]) {
        Some(SeriesData::Rate { total, hits }) => (total, hits),
        _ => (0, 0),
    }
}

/// Turns successive snapshots into per-interval rates.
#[derive(Debug, Default)]
pub(crate) struct LiveMetricsComputer {
    requests: IntervalCounter,
    failed: IntervalCounter,
    iterations: IntervalCounter,
    bytes_sent: IntervalCounter,
    bytes_received: IntervalCounter,
    rps_stats: RunningStats,
}

impl LiveMetricsComputer {
    pub(crate) fn compute(&mut self, snapshot: &MetricsSnapshot, dt_secs: f64) -> LiveMetrics {
        let (_, failed_hits) = rate_parts(snapshot, HTTP_REQ_FAILED);
        let (checks_total, checks_hits) = rate_parts(snapshot, CHECKS);

        let requests = self.requests.advance(snapshot.counter(HTTP_REQS), dt_secs);
        let failed = self.failed.advance(failed_hits, dt_secs);
        let iterations = self.iterations.advance(snapshot.counter(ITERATIONS), dt_secs);
        let sent = self.bytes_sent.advance(snapshot.counter(DATA_SENT), dt_secs);
        let received = self.bytes_received.advance(snapshot.counter(DATA_RECEIVED), dt_secs);

        self.rps_stats.push(requests.per_sec);

        let error_rate_now = if requests.delta == 0 {
            0.0
        } else {
            (failed.delta as f64 / requests.delta as f64).min(1.0)
        };

        let latency = match snapshot.aggregate(HTTP_REQ_DURATION, &[]).map(|d| d.value()) {
            Some(MetricValue::Trend(t)) => Some(t),
            _ => None,
        };

        LiveMetrics {
            rps_now: requests.per_sec,
            requests_total: requests.total,
            failed_requests_total: failed.total,
            error_rate_now,
            iterations_total: iterations.total,
            iterations_per_sec_now: iterations.per_sec,
            bytes_received_total: received.total,
            bytes_sent_total: sent.total,
            bytes_received_per_sec_now: received.per_sec.round() as u64,
            bytes_sent_per_sec_now: sent.per_sec.round() as u64,
            checks_failed_total: checks_total.saturating_sub(checks_hits),
            req_per_sec_avg: self.rps_stats.mean(),
            req_per_sec_stdev: self.rps_stats.stdev(),
            req_per_sec_max: self.rps_stats.max(),
            latency_mean_ms: latency.as_ref().and_then(|t| t.avg),
            latency_p50_ms: latency.as_ref().and_then(|t| t.p50),
            latency_p90_ms: latency.as_ref().and_then(|t| t.p90),
            latency_p95_ms: latency.as_ref().and_then(|t| t.p95),
            latency_p99_ms: latency.as_ref().and_then(|t| t.p99),
            latency_max_ms: latency.as_ref().and_then(|t| t.max),
        }
    }
}
