use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use surge_metrics::{Observation, Registry};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::builtin::{ITERATION_DURATION, ITERATION_FAILED, ITERATIONS};
use crate::config::ThinkTime;
use crate::work::{IterationContext, WorkUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum SlotState {
    Idle = 0,
    Running = 1,
    Sleeping = 2,
    Retiring = 3,
}

impl SlotState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SlotState::Running,
            2 => SlotState::Sleeping,
            3 => SlotState::Retiring,
            _ => SlotState::Idle,
        }
    }
}

/// Slot state shared between the slot task and the control loop.
///
/// `Retiring` is sticky: once set, the slot task cannot move the cell back.
#[derive(Debug, Default)]
pub(crate) struct SlotStateCell(AtomicU8);

impl SlotStateCell {
    pub(crate) fn get(&self) -> SlotState {
        SlotState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn retire(&self) {
        self.0.store(SlotState::Retiring as u8, Ordering::Release);
    }

    fn transition(&self, to: SlotState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != SlotState::Retiring as u8).then_some(to as u8)
            });
    }
}

/// Control-loop side of a live slot.
#[derive(Debug)]
pub(crate) struct SlotHandle {
    pub(crate) id: u64,
    pub(crate) state: Arc<SlotStateCell>,
    pub(crate) retire: CancellationToken,
}

impl SlotHandle {
    pub(crate) fn retire(&self) {
        self.state.retire();
        self.retire.cancel();
    }
}

pub(crate) struct SlotContext {
    pub(crate) id: u64,
    pub(crate) state: Arc<SlotStateCell>,
    pub(crate) retire: CancellationToken,
    pub(crate) work: Arc<dyn WorkUnit>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) think_time: Option<ThinkTime>,
}

/// Runs iterations until the slot is retired or the run stops.
///
/// An iteration in flight always completes; retirement is only observed between iterations and
/// during think time.
pub(crate) async fn run_slot(ctx: SlotContext) {
    let SlotContext {
        id,
        state,
        retire,
        work,
        registry,
        think_time,
    } = ctx;

    let mut rng = StdRng::from_rng(&mut rand::rng());
    let mut iteration: u64 = 0;

    tracing::trace!(slot = id, "slot started");

    while !retire.is_cancelled() {
        state.transition(SlotState::Running);

        let iter_ctx = IterationContext {
            slot_id: id,
            iteration,
            retire: retire.clone(),
        };

        let started = Instant::now();
        let result = work.execute(&iter_ctx).await;
        let elapsed = started.elapsed();

        let failed = match result {
            Ok(observations) => {
                for obs in &observations {
                    registry.record(obs);
                }
                false
            }
            Err(err) => {
                tracing::debug!(slot = id, iteration, error = %err, "iteration failed");
                true
            }
        };

        registry.record(&Observation::new(ITERATIONS, 1.0));
        registry.record(&Observation::new(
            ITERATION_DURATION,
            elapsed.as_secs_f64() * 1000.0,
        ));
        registry.record(&Observation::flag(ITERATION_FAILED, failed));
        iteration = iteration.saturating_add(1);

        if let Some(tt) = think_time {
            let pause = tt.sample(&mut rng);
            if !pause.is_zero() {
                state.transition(SlotState::Sleeping);
                tokio::select! {
                    _ = retire.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        } else {
            tokio::task::yield_now().await;
        }
    }

    tracing::trace!(slot = id, iterations = iteration, "slot exiting");
}
