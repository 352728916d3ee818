use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use surge_core::{ProgressFn, ProgressUpdate, RunOutcome, RunReport};

use super::OutputFormatter;
use super::view;
use crate::config_file::LoadedConfig;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config_path: &Path, _config: &LoadedConfig) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: u64,
    pub interval_secs: f64,
    pub stage: Option<usize>,
    pub stages: Option<usize>,
    pub vus: u64,
    pub vus_target: u64,
    pub vus_max: u64,

    pub requests_per_sec: f64,
    pub iterations_per_sec: f64,
    pub error_rate: f64,
    pub bytes_received_per_sec: u64,
    pub bytes_sent_per_sec: u64,

    pub total_requests: u64,
    pub total_failed_requests: u64,
    pub total_iterations: u64,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
    pub checks_failed_total: u64,

    pub latency_mean: Option<f64>,
    pub latency_p50: Option<f64>,
    pub latency_p90: Option<f64>,
    pub latency_p95: Option<f64>,
    pub latency_p99: Option<f64>,
    pub latency_max: Option<f64>,

    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    let m = &u.metrics;
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs(),
        interval_secs: u.interval.as_secs_f64(),
        stage: u.stage.as_ref().map(|s| s.stage),
        stages: u.stage.as_ref().map(|s| s.stages),
        vus: u.vus,
        vus_target: u.vus_target,
        vus_max: u.vus_max,

        requests_per_sec: m.rps_now,
        iterations_per_sec: m.iterations_per_sec_now,
        error_rate: m.error_rate_now,
        bytes_received_per_sec: m.bytes_received_per_sec_now,
        bytes_sent_per_sec: m.bytes_sent_per_sec_now,

        total_requests: m.requests_total,
        total_failed_requests: m.failed_requests_total,
        total_iterations: m.iterations_total,
        total_bytes_received: m.bytes_received_total,
        total_bytes_sent: m.bytes_sent_total,
        checks_failed_total: m.checks_failed_total,

        latency_mean: m.latency_mean_ms,
        latency_p50: m.latency_p50_ms,
        latency_p90: m.latency_p90_ms,
        latency_p95: m.latency_p95_ms,
        latency_p99: m.latency_p99_ms,
        latency_max: m.latency_max_ms,

        req_per_sec_avg: m.req_per_sec_avg,
        req_per_sec_stdev: m.req_per_sec_stdev,
        req_per_sec_max: m.req_per_sec_max,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_detail: Option<String>,
    pub passed: bool,
    pub elapsed_secs: f64,
    pub slots: JsonSlots,
    pub totals: JsonTotals,
    pub latency: Option<JsonLatencySummary>,
    pub endpoints: Vec<JsonEndpoint>,
    pub checks: Vec<JsonCheck>,
    pub thresholds: Vec<JsonThreshold>,
    pub dropped_observations: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSlots {
    pub peak: u64,
    pub spawned: u64,
    pub retired: u64,
    pub completed: u64,
    pub abandoned: u64,
    pub faulted: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTotals {
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonEndpoint {
    pub endpoint: String,
    pub requests: u64,
    pub failed: u64,
    pub p95: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub passed: bool,
    pub observed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let snap = &report.result.snapshot;
    let totals = view::totals(snap);
    let s = report.slots;

    let outcome_detail = match &report.outcome {
        RunOutcome::AbortedByThreshold { metric, expression } => {
            Some(format!("{metric}: {expression}"))
        }
        RunOutcome::Degraded { reason } => Some(reason.clone()),
        RunOutcome::Completed | RunOutcome::Cancelled => None,
    };

    JsonSummaryLine {
        kind: "summary",
        outcome: view::outcome_label(&report.outcome),
        outcome_detail,
        passed: report.result.passed,
        elapsed_secs: report.elapsed.as_secs_f64(),
        slots: JsonSlots {
            peak: s.peak,
            spawned: s.spawned,
            retired: s.retired,
            completed: s.completed,
            abandoned: s.abandoned,
            faulted: s.faulted,
        },
        totals: JsonTotals {
            requests_total: totals.requests,
            failed_requests_total: totals.failed_requests,
            iterations_total: totals.iterations,
            bytes_received_total: totals.bytes_received,
            bytes_sent_total: totals.bytes_sent,
        },
        latency: view::latency(snap).map(|t| JsonLatencySummary {
            p50: t.p50,
            p75: t.p75,
            p90: t.p90,
            p95: t.p95,
            p99: t.p99,
            min: t.min,
            max: t.max,
            mean: t.avg,
            stdev: t.stdev,
            count: t.count,
        }),
        endpoints: view::endpoints(snap)
            .into_iter()
            .map(|e| JsonEndpoint {
                endpoint: e.endpoint,
                requests: e.requests,
                failed: e.failed,
                p95: e.p95_ms,
            })
            .collect(),
        checks: view::checks(snap)
            .into_iter()
            .map(|c| JsonCheck {
                name: c.name,
                passes: c.passes,
                fails: c.fails,
            })
            .collect(),
        thresholds: report
            .result
            .thresholds
            .iter()
            .map(|t| JsonThreshold {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                passed: t.passed(),
                observed: t.observed,
                reason: t.failure.map(|r| r.to_string()),
            })
            .collect(),
        dropped_observations: report.dropped_observations,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
