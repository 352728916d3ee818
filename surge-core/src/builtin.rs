//! Metrics every run registers, named after their k6 counterparts.

use surge_metrics::{MetricDef, MetricKind, Registry};

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const DATA_SENT: &str = "data_sent";
pub const DATA_RECEIVED: &str = "data_received";
pub const CHECKS: &str = "checks";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ITERATION_FAILED: &str = "iteration_failed";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";

pub fn builtin_metrics() -> Vec<MetricDef> {
    [
        (HTTP_REQS, MetricKind::Counter),
        (HTTP_REQ_DURATION, MetricKind::Trend),
        (HTTP_REQ_FAILED, MetricKind::Rate),
        (DATA_SENT, MetricKind::Counter),
        (DATA_RECEIVED, MetricKind::Counter),
        (CHECKS, MetricKind::Rate),
        (ITERATIONS, MetricKind::Counter),
        (ITERATION_DURATION, MetricKind::Trend),
        (ITERATION_FAILED, MetricKind::Rate),
        (VUS, MetricKind::Gauge),
        (VUS_MAX, MetricKind::Gauge),
    ]
    .into_iter()
    .map(|(name, kind)| MetricDef::new(name, kind))
    .collect()
}

pub fn register_builtin_metrics(registry: &Registry) -> surge_metrics::Result<()> {
    registry.register_all(&builtin_metrics())
}
