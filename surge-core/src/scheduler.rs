use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use surge_metrics::{Observation, Registry};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::builtin::{VUS, VUS_MAX, register_builtin_metrics};
use crate::config::RunConfig;
use crate::error::Result;
use crate::evaluator::{evaluate, evaluate_outcomes, validate_thresholds};
use crate::progress::{LiveMetricsComputer, ProgressFn, ProgressUpdate, StageProgress};
use crate::result::{FailureReason, RunOutcome, RunReport, SlotStats};
use crate::schedule::StageSchedule;
use crate::slot::{SlotContext, SlotHandle, SlotStateCell, run_slot};
use crate::thresholds::ThresholdSet;
use crate::work::WorkUnit;

/// Live counters readable while a run is in progress.
#[derive(Debug, Default)]
pub struct RunState {
    live: AtomicU64,
    target: AtomicU64,
    peak: AtomicU64,
}

impl RunState {
    /// Slots currently running or sleeping (not retiring).
    pub fn live(&self) -> u64 {
        self.live.load(Ordering::Relaxed)
    }

    /// Target slot count after the concurrency cap.
    pub fn target(&self) -> u64 {
        self.target.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    fn set_live(&self, n: u64) {
        self.live.store(n, Ordering::Relaxed);
        self.peak.fetch_max(n, Ordering::Relaxed);
    }
}

/// Drives a [`WorkUnit`] through a stage schedule.
pub struct Scheduler {
    config: Arc<RunConfig>,
    schedule: Arc<StageSchedule>,
    registry: Arc<Registry>,
    state: Arc<RunState>,
}

enum Stop {
    Completed,
    Cancelled,
    Aborted { metric: String, expression: String },
}

impl Scheduler {
    /// Validates `config` and registers the built-in metrics on `registry`.
    pub fn new(config: RunConfig, registry: Arc<Registry>) -> Result<Self> {
        config.validate()?;
        register_builtin_metrics(&registry)?;

        let schedule = StageSchedule::new(config.start_vus, config.stages.clone());
        Ok(Self {
            config: Arc::new(config),
            schedule: Arc::new(schedule),
            registry,
            state: Arc::new(RunState::default()),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    pub fn schedule(&self) -> &StageSchedule {
        &self.schedule
    }

    pub async fn start(
        &self,
        work: Arc<dyn WorkUnit>,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        self.start_with_progress(work, cancel, None).await
    }

    /// Runs the schedule to completion, cancellation or threshold abort.
    ///
    /// Configuration problems (unknown threshold metrics, conflicting metric kinds) are returned
    /// as `Err` before any slot starts. Once slots are running the call always yields a report.
    pub async fn start_with_progress(
        &self,
        work: Arc<dyn WorkUnit>,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
    ) -> Result<RunReport> {
        self.registry.register_all(&work.metrics())?;
        validate_thresholds(&self.config.thresholds, &self.registry)?;

        let started = Instant::now();
        let run_token = cancel.child_token();

        tracing::info!(
            stages = self.config.stages.len(),
            peak_target = self.schedule.peak_target(),
            duration = ?self.schedule.total_duration(),
            "run starting"
        );

        let progress_handle = progress.map(|progress| self.spawn_progress(progress, started));

        let mut control = ControlLoop::new(self, work, run_token.clone());
        let stop = control.drive(started).await;

        run_token.cancel();
        control.drain().await;
        if let Some(h) = progress_handle {
            h.abort();
        }

        self.state.set_live(0);
        self.state.target.store(0, Ordering::Relaxed);
        self.registry.record(&Observation::new(VUS, 0.0));
        self.registry
            .record(&Observation::new(VUS_MAX, self.state.peak() as f64));

        let outcome = match stop {
            Stop::Aborted { metric, expression } => {
                RunOutcome::AbortedByThreshold { metric, expression }
            }
            Stop::Cancelled => RunOutcome::Cancelled,
            Stop::Completed => {
                let mut reasons: Vec<String> = control.degraded.take().into_iter().collect();
                if control.stats.abandoned > 0 {
                    reasons.push(format!(
                        "{} slots abandoned after graceful stop",
                        control.stats.abandoned
                    ));
                }
                if reasons.is_empty() {
                    RunOutcome::Completed
                } else {
                    RunOutcome::Degraded {
                        reason: reasons.join("; "),
                    }
                }
            }
        };

        let mut slots = control.stats;
        slots.peak = self.state.peak();
        let elapsed = started.elapsed();

        tracing::info!(
            outcome = ?outcome,
            elapsed = ?elapsed,
            spawned = slots.spawned,
            abandoned = slots.abandoned,
            faulted = slots.faulted,
            "run finished"
        );

        let result = evaluate(&self.config.thresholds, self.registry.snapshot());
        Ok(RunReport {
            outcome,
            result,
            slots,
            elapsed,
            dropped_observations: self.registry.dropped(),
        })
    }

    fn spawn_progress(
        &self,
        progress: ProgressFn,
        started: Instant,
    ) -> tokio::task::JoinHandle<()> {
        let registry = self.registry.clone();
        let schedule = self.schedule.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // The first tick fires immediately; report after a full interval instead.
            interval.tick().await;

            let mut tick: u64 = 0;
            let mut last_at = Instant::now();
            let mut live = LiveMetricsComputer::default();

            loop {
                interval.tick().await;

                tick = tick.saturating_add(1);
                let now = Instant::now();
                let dt = now.duration_since(last_at);
                last_at = now;
                let elapsed = now.duration_since(started);

                let metrics = live.compute(&registry.snapshot(), dt.as_secs_f64().max(1e-9));
                progress(ProgressUpdate {
                    tick,
                    interval: dt,
                    elapsed,
                    total_duration: schedule.total_duration(),
                    stage: StageProgress::at(&schedule, elapsed),
                    vus: state.live(),
                    vus_target: state.target(),
                    vus_max: state.peak(),
                    metrics,
                });
            }
        })
    }
}

struct ControlLoop<'a> {
    scheduler: &'a Scheduler,
    work: Arc<dyn WorkUnit>,
    run_token: CancellationToken,
    slots: VecDeque<SlotHandle>,
    tasks: JoinSet<()>,
    task_slots: HashMap<tokio::task::Id, u64>,
    next_id: u64,
    stats: SlotStats,
    degraded: Option<String>,
    abort_sets: Vec<ThresholdSet>,
}

impl<'a> ControlLoop<'a> {
    fn new(
        scheduler: &'a Scheduler,
        work: Arc<dyn WorkUnit>,
        run_token: CancellationToken,
    ) -> Self {
        let abort_sets = scheduler
            .config
            .thresholds
            .iter()
            .filter(|s| s.abort_on_fail)
            .cloned()
            .collect();

        Self {
            scheduler,
            work,
            run_token,
            slots: VecDeque::new(),
            tasks: JoinSet::new(),
            task_slots: HashMap::new(),
            next_id: 0,
            stats: SlotStats::default(),
            degraded: None,
            abort_sets,
        }
    }

    async fn drive(&mut self, started: Instant) -> Stop {
        let config = self.scheduler.config.clone();
        let schedule = self.scheduler.schedule.clone();

        let mut interval = tokio::time::interval(config.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_check = started + config.threshold_check_interval;

        loop {
            tokio::select! {
                biased;
                _ = self.run_token.cancelled() => {
                    tracing::info!("run cancelled");
                    return Stop::Cancelled;
                }
                _ = interval.tick() => {}
            }

            self.reap();

            let elapsed = started.elapsed();
            if schedule.is_done(elapsed) {
                return Stop::Completed;
            }

            let target = self.capped(schedule.target_at(elapsed), config.max_vus);
            self.converge(target);

            let live = self.slots.len() as u64;
            self.scheduler.state.set_live(live);
            self.scheduler.state.target.store(target, Ordering::Relaxed);
            self.scheduler
                .registry
                .record(&Observation::new(VUS, live as f64));
            self.scheduler.registry.record(&Observation::new(
                VUS_MAX,
                self.scheduler.state.peak() as f64,
            ));

            if !self.abort_sets.is_empty() && Instant::now() >= next_check {
                next_check = Instant::now() + config.threshold_check_interval;
                if let Some(stop) = self.check_abort() {
                    return stop;
                }
            }
        }
    }

    fn capped(&mut self, target: u64, max_vus: Option<u64>) -> u64 {
        match max_vus {
            Some(cap) if target > cap => {
                if self.degraded.is_none() {
                    tracing::warn!(target, cap, "target exceeds the concurrency cap; clamping");
                    self.degraded = Some(format!("target {target} clamped to cap {cap}"));
                }
                cap
            }
            _ => target,
        }
    }

    fn converge(&mut self, target: u64) {
        let live = self.slots.len() as u64;
        if live < target {
            for _ in live..target {
                self.spawn_slot();
            }
        } else {
            for _ in target..live {
                self.retire_oldest();
            }
        }
    }

    fn spawn_slot(&mut self) {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);

        let state = Arc::new(SlotStateCell::default());
        let retire = self.run_token.child_token();
        let ctx = SlotContext {
            id,
            state: state.clone(),
            retire: retire.clone(),
            work: self.work.clone(),
            registry: self.scheduler.registry.clone(),
            think_time: self.scheduler.config.think_time,
        };

        let handle = self.tasks.spawn(run_slot(ctx));
        self.task_slots.insert(handle.id(), id);
        self.slots.push_back(SlotHandle { id, state, retire });
        self.stats.spawned += 1;
    }

    fn retire_oldest(&mut self) {
        if let Some(slot) = self.slots.pop_front() {
            let was = slot.state.get();
            slot.retire();
            self.stats.retired += 1;
            tracing::trace!(slot = slot.id, state = %was, "retiring slot");
        }
    }

    fn reap(&mut self) {
        while let Some(res) = self.tasks.try_join_next_with_id() {
            self.on_exit(res);
        }
    }

    fn on_exit(&mut self, res: std::result::Result<(tokio::task::Id, ()), JoinError>) {
        match res {
            Ok((task, ())) => {
                self.forget(task);
                self.stats.completed += 1;
            }
            Err(err) if err.is_panic() => {
                let slot = self.forget(err.id());
                self.stats.faulted += 1;
                tracing::warn!(slot = ?slot, "slot panicked; it will be replaced");
            }
            Err(err) => {
                self.forget(err.id());
                self.stats.abandoned += 1;
            }
        }
    }

    fn forget(&mut self, task: tokio::task::Id) -> Option<u64> {
        let slot = self.task_slots.remove(&task)?;
        if let Some(pos) = self.slots.iter().position(|s| s.id == slot) {
            self.slots.remove(pos);
        }
        Some(slot)
    }

    fn check_abort(&self) -> Option<Stop> {
        let snapshot = self.scheduler.registry.snapshot();
        evaluate_outcomes(&self.abort_sets, &snapshot)
            .into_iter()
            .find(|o| o.failure == Some(FailureReason::Violated))
            .map(|o| {
                tracing::warn!(
                    metric = %o.metric,
                    expression = %o.expression,
                    observed = ?o.observed,
                    "threshold crossed; aborting run"
                );
                Stop::Aborted {
                    metric: o.metric,
                    expression: o.expression,
                }
            })
    }

    /// Waits up to the graceful stop window for slots to finish, then abandons the rest.
    async fn drain(&mut self) {
        for slot in &self.slots {
            slot.state.retire();
        }
        let grace = tokio::time::sleep(self.scheduler.config.graceful_stop);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                res = self.tasks.join_next_with_id() => match res {
                    Some(res) => self.on_exit(res),
                    None => break,
                },
                _ = &mut grace => {
                    let remaining = self.tasks.len();
                    if remaining > 0 {
                        tracing::warn!(remaining, "graceful stop expired; abandoning slots");
                    }
                    self.tasks.abort_all();
                    while let Some(res) = self.tasks.join_next_with_id().await {
                        self.on_exit(res);
                    }
                    break;
                }
            }
        }
        self.slots.clear();
    }
}
