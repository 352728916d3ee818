use std::time::Duration;

use crate::config::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise-linear target over time.
///
/// Each stage ramps from the previous stage's target (the start target for the first stage) to
/// its own target. Stages with equal endpoints are plateaus.
#[derive(Debug, Clone)]
pub struct StageSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl StageSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    pub fn start_target(&self) -> u64 {
        self.start
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Highest target the schedule ever asks for.
    pub fn peak_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u64::max)
    }

    fn stage_index(&self, elapsed: Duration) -> usize {
        // A stage owns (start, end]; the boundary instant belongs to the stage that ends there.
        match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) | Err(i) => i.min(self.stages.len().saturating_sub(1)),
        }
    }

    fn stage_bounds(&self, idx: usize) -> (Duration, Duration, u64, u64) {
        let stage_end = self.cumulative_ends[idx];
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let start_target = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        (stage_start, stage_end, start_target, self.stages[idx].target)
    }

    /// Target slot count at `elapsed`, rounded to the nearest integer.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.stages.is_empty() || elapsed.is_zero() {
            return self.start;
        }

        if elapsed >= self.total_duration() {
            return self.stages.last().map(|s| s.target).unwrap_or(self.start);
        }

        let idx = self.stage_index(elapsed);
        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);

        let stage_duration = stage_end.saturating_sub(stage_start);
        if stage_duration.is_zero() {
            return end_target;
        }
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_i = start_target as i128;
        let delta = end_target as i128 - start_i;
        let num = stage_elapsed.as_nanos() as i128;
        let den = stage_duration.as_nanos() as i128;

        let cur = start_i + div_round(delta.saturating_mul(num), den.max(1));
        cur.clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let clamped = elapsed.min(self.total_duration());
        let idx = self.stage_index(clamped);
        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);

        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target,
            end_target,
            current_target: self.target_at(clamped),
        })
    }

    /// Largest change of the target across a window of length `tick` inside a single stage.
    ///
    /// This is how far a control loop re-reading the target every `tick` can lag mid-stage.
    pub fn ramp_step(&self, tick: Duration) -> u64 {
        let mut prev = self.start;
        let mut step = 0u64;
        for stage in &self.stages {
            let delta = stage.target.abs_diff(prev);
            let per_tick = if stage.duration.is_zero() {
                delta
            } else {
                let exact = (delta as u128 * tick.as_nanos()).div_ceil(stage.duration.as_nanos());
                // Rounding both window endpoints to nearest can add one more.
                exact.saturating_add(1).min(delta as u128) as u64
            };
            step = step.max(per_tick);
            prev = stage.target;
        }
        step
    }
}

/// Integer division rounding half away from zero.
fn div_round(num: i128, den: i128) -> i128 {
    let half = den / 2;
    if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(secs: u64, target: u64) -> Stage {
        Stage {
            duration: Duration::from_secs(secs),
            target,
        }
    }

    #[test]
    fn ramps_linearly_and_rounds_to_nearest() {
        let s = StageSchedule::new(0, vec![stage(10, 3)]);
        assert_eq!(s.target_at(Duration::ZERO), 0);
        // 3 * 1.5 / 10 = 0.45
        assert_eq!(s.target_at(Duration::from_millis(1500)), 0);
        // 3 * 1.7 / 10 = 0.51
        assert_eq!(s.target_at(Duration::from_millis(1700)), 1);
        assert_eq!(s.target_at(Duration::from_secs(5)), 2);
        assert_eq!(s.target_at(Duration::from_secs(10)), 3);
        assert_eq!(s.target_at(Duration::from_secs(60)), 3);
    }

    #[test]
    fn plateaus_and_ramp_down() {
        let s = StageSchedule::new(0, vec![stage(30, 200), stage(60, 200), stage(30, 100)]);
        assert_eq!(s.total_duration(), Duration::from_secs(120));
        assert_eq!(s.target_at(Duration::from_secs(15)), 100);
        assert_eq!(s.target_at(Duration::from_secs(30)), 200);
        assert_eq!(s.target_at(Duration::from_secs(75)), 200);
        assert_eq!(s.target_at(Duration::from_secs(105)), 150);
        assert!(s.is_done(Duration::from_secs(120)));
        assert_eq!(s.peak_target(), 200);
    }

    #[test]
    fn zero_duration_stage_jumps() {
        let s = StageSchedule::new(5, vec![stage(0, 50), stage(10, 50)]);
        assert_eq!(s.target_at(Duration::from_millis(1)), 50);
    }

    #[test]
    fn stage_snapshot_reports_position() {
        let s = StageSchedule::new(0, vec![stage(10, 100), stage(10, 100)]);
        let snap = s
            .stage_snapshot_at(Duration::from_secs(12))
            .unwrap_or_else(|| panic!("expected snapshot"));
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 2);
        assert_eq!(snap.stage_elapsed, Duration::from_secs(2));
        assert_eq!(snap.stage_remaining, Duration::from_secs(8));
        assert_eq!(snap.current_target, 100);

        let end = s
            .stage_snapshot_at(Duration::from_secs(99))
            .unwrap_or_else(|| panic!("expected snapshot"));
        assert_eq!(end.index, 1);
        assert_eq!(end.stage_remaining, Duration::ZERO);
    }

    #[test]
    fn ramp_step_bounds_per_tick_change() {
        let s = StageSchedule::new(0, vec![stage(30, 200), stage(30, 1000), stage(30, 100)]);
        let tick = Duration::from_millis(100);
        // Steepest stage: 800 over 30s → ~2.67 per 100ms.
        let step = s.ramp_step(tick);
        assert!((3..=4).contains(&step), "step={step}");

        let mut t = Duration::ZERO;
        while t < s.total_duration() {
            let next = t + tick;
            assert!(s.target_at(t).abs_diff(s.target_at(next)) <= step);
            t = next;
        }
    }
}
