use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration and setup failures. Every variant is raised before the first slot starts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    NoStages,

    #[error("total stage duration must be greater than zero")]
    ZeroDuration,

    #[error("`tick` must be a positive duration")]
    InvalidTick,

    #[error("`threshold_check_interval` must be a positive duration")]
    InvalidThresholdCheckInterval,

    #[error("invalid think time: min {min:?} is greater than max {max:?}")]
    InvalidThinkTime { min: Duration, max: Duration },

    #[error("`max_vus` must be a positive integer")]
    InvalidMaxVus,

    #[error("invalid threshold for metric `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("threshold references unknown metric `{0}`")]
    UnknownThresholdMetric(String),

    #[error("invalid base url `{0}`")]
    InvalidBaseUrl(String),

    #[error("invalid endpoint `{path}`: {reason}")]
    InvalidEndpoint { path: String, reason: String },

    #[error("at least one endpoint with a positive weight is required")]
    NoEndpoints,

    #[error(transparent)]
    Metrics(#[from] surge_metrics::Error),
}

/// Failure of a single work unit execution. The slot records it and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("{kind}: {message}")]
    Transport {
        kind: surge_http::TransportErrorKind,
        message: String,
    },

    #[error("{0}")]
    Failed(String),
}
