#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed (including a threshold abort).
    ThresholdsFailed = 11,

    /// Thresholds passed but the run did not follow its schedule (cancelled or degraded).
    Incomplete = 13,

    /// Invalid CLI/config (bad flags, invalid durations, invalid thresholds syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_report(report: &surge_core::RunReport) -> Self {
        if !report.result.passed {
            return Self::ThresholdsFailed;
        }
        match report.outcome {
            surge_core::RunOutcome::Completed => Self::Success,
            surge_core::RunOutcome::AbortedByThreshold { .. } => Self::ThresholdsFailed,
            surge_core::RunOutcome::Cancelled | surge_core::RunOutcome::Degraded { .. } => {
                Self::Incomplete
            }
        }
    }
}
