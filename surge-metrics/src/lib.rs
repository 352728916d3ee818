//! Thread-safe metric aggregation for load runs.
//!
//! Work units emit [`Observation`]s; the [`Registry`] folds them into per-`(metric, tags)`
//! series and hands out immutable [`MetricsSnapshot`]s for reporting and threshold evaluation.

mod error;
mod histogram;
mod key;
mod metrics;
mod observation;
mod registry;
mod snapshot;
mod tags;

pub mod agg;

pub use error::{Error, Result};
pub use histogram::{SIGNIFICANT_DIGITS, TrendData};
pub use key::KeyId;
pub use metrics::{MetricDef, MetricKind, MetricValue, SeriesData, TrendSummary};
pub use observation::Observation;
pub use registry::{MetricId, Registry};
pub use snapshot::{MetricSnapshot, MetricsSnapshot, SeriesSnapshot};
pub use tags::TagSet;
