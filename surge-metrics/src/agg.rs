//! Helpers for turning cumulative totals into per-interval figures.

/// Streaming mean, sample standard deviation and extremes (Welford).
#[derive(Debug, Default, Clone, Copy)]
pub struct RunningStats {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        if self.n == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.n = self.n.saturating_add(1);

        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        match self.n {
            0 | 1 => 0.0,
            n => (self.m2 / (n - 1) as f64).sqrt(),
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// What a counter did during one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Interval {
    pub total: u64,
    pub delta: u64,
    pub per_sec: f64,
}

/// Remembers the last cumulative total of a counter.
///
/// The first interval counts everything seen so far. A total that went backwards yields a zero
/// delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalCounter {
    last: Option<u64>,
}

impl IntervalCounter {
    pub fn advance(&mut self, total: u64, dt_secs: f64) -> Interval {
        let delta = match self.last.replace(total) {
            Some(last) => total.saturating_sub(last),
            None => total,
        };
        Interval {
            total,
            delta,
            per_sec: per_sec(delta, dt_secs),
        }
    }
}

/// `delta / dt`, with `dt` clamped away from zero.
#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    delta as f64 / dt_secs.max(1e-9)
}
