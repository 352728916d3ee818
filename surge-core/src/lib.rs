mod builtin;
mod checks;
mod config;
mod error;
mod evaluator;
mod harness;
mod progress;
mod result;
mod schedule;
mod scheduler;
mod slot;
mod thresholds;
mod transport;
mod work;

pub use builtin::{
    CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS,
    ITERATION_DURATION, ITERATION_FAILED, ITERATIONS, VUS, VUS_MAX, builtin_metrics,
    register_builtin_metrics,
};
pub use checks::{Check, CheckFn, CheckInput};
pub use config::{
    DEFAULT_GRACEFUL_STOP, DEFAULT_THRESHOLD_CHECK_INTERVAL, DEFAULT_TICK, Endpoint, HttpTarget,
    RunConfig, Stage, ThinkTime,
};
pub use error::{Error, Result, WorkError};
pub use evaluator::{evaluate, validate_thresholds};
pub use harness::HttpWorkUnit;
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate, StageProgress};
pub use result::{
    FailureReason, RunOutcome, RunReport, SlotStats, TestResult, ThresholdFailure,
    ThresholdOutcome,
};
pub use schedule::{StageSchedule, StageSnapshot};
pub use scheduler::{RunState, Scheduler};
pub use slot::SlotState;
pub use thresholds::{
    ParsedThreshold, ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdSet,
    parse_metric_selector, parse_threshold_expr,
};
pub use transport::{HttpTransport, TransportError};
pub use work::{IterationContext, WorkUnit};

pub use surge_metrics;
