use async_trait::async_trait;
use surge_metrics::{MetricDef, Observation};
use tokio_util::sync::CancellationToken;

use crate::error::WorkError;

/// Per-iteration context handed to a [`WorkUnit`].
#[derive(Debug, Clone)]
pub struct IterationContext {
    pub slot_id: u64,
    /// 0-based iteration counter of this slot.
    pub iteration: u64,
    /// Fires when the slot is asked to retire or the run stops.
    ///
    /// Work units may use it to cut long waits short; they are never required to.
    pub retire: CancellationToken,
}

/// One scripted user action, executed repeatedly by every live slot.
#[async_trait]
pub trait WorkUnit: Send + Sync + 'static {
    /// Metrics the unit emits beyond the built-in ones. Registered before the run starts.
    fn metrics(&self) -> Vec<MetricDef> {
        Vec::new()
    }

    /// Performs one iteration.
    ///
    /// Observations in the `Ok` value are recorded by the caller. An `Err` marks the iteration as
    /// failed; the slot keeps running.
    async fn execute(&self, ctx: &IterationContext) -> Result<Vec<Observation>, WorkError>;
}
