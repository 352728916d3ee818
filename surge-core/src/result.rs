use std::time::Duration;

use surge_metrics::MetricsSnapshot;

/// Why a threshold expression did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    /// The metric was never registered.
    MissingMetric,
    /// The metric (after tag selection) has no samples.
    NoData,
    /// The aggregation is not defined for the metric's kind.
    UnsupportedAggregation,
    /// The expression could not be parsed.
    InvalidExpression,
    /// The observed value does not satisfy the comparison.
    Violated,
}

/// Evaluation result of one expression of one threshold set.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub failure: Option<FailureReason>,
}

impl ThresholdOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdFailure {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub reason: FailureReason,
}

#[derive(Debug, Clone)]
pub struct TestResult {
    /// `true` when every threshold passed.
    pub passed: bool,
    pub snapshot: MetricsSnapshot,
    /// Every evaluated expression, in declaration order.
    pub thresholds: Vec<ThresholdOutcome>,
    pub failed_thresholds: Vec<ThresholdFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The schedule ran to its end.
    Completed,
    /// Stopped early by the caller.
    Cancelled,
    /// Stopped early by a failing `abort_on_fail` threshold.
    AbortedByThreshold { metric: String, expression: String },
    /// Ran to the end, but could not follow the schedule exactly or had to abandon slots.
    Degraded { reason: String },
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub spawned: u64,
    /// Slots asked to retire because the target dropped.
    pub retired: u64,
    /// Slots that exited on their own (after retirement or at stop).
    pub completed: u64,
    /// Slots still busy when the graceful stop window closed.
    pub abandoned: u64,
    /// Slot tasks that panicked.
    pub faulted: u64,
    pub peak: u64,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub result: TestResult,
    pub slots: SlotStats,
    pub elapsed: Duration,
    /// Observations the registry rejected.
    pub dropped_observations: u64,
}
