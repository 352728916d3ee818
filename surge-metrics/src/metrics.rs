use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::histogram::{MICROS_PER_MILLI, StripedHistogram, TrendData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

/// A metric declaration: name plus kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDef {
    pub name: String,
    pub kind: MetricKind,
}

impl MetricDef {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Default)]
pub struct Rate {
    pub total: AtomicU64,
    pub hits: AtomicU64,
}

/// Live storage for one `(metric, tags)` series.
#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(AtomicU64),
    Gauge(AtomicI64), // Supports negative values
    Rate(Rate),
    Trend(StripedHistogram),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricStorage::Counter(AtomicU64::new(0)),
            MetricKind::Gauge => MetricStorage::Gauge(AtomicI64::new(0)),
            MetricKind::Rate => MetricStorage::Rate(Rate::default()),
            MetricKind::Trend => MetricStorage::Trend(StripedHistogram::new()),
        }
    }

    /// Applies one observed value. Returns `false` when the value is not valid for the kind.
    pub(crate) fn apply(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }

        match self {
            MetricStorage::Counter(c) => {
                if value < 0.0 {
                    return false;
                }
                c.fetch_add(value.round() as u64, Ordering::Relaxed);
                true
            }
            MetricStorage::Gauge(g) => {
                g.store(value.round() as i64, Ordering::Relaxed);
                true
            }
            MetricStorage::Rate(r) => {
                r.total.fetch_add(1, Ordering::Relaxed);
                if value != 0.0 {
                    r.hits.fetch_add(1, Ordering::Relaxed);
                }
                true
            }
            MetricStorage::Trend(h) => {
                if value < 0.0 {
                    return false;
                }
                h.record((value * MICROS_PER_MILLI).round() as u64)
            }
        }
    }

    pub(crate) fn read(&self) -> SeriesData {
        match self {
            MetricStorage::Counter(c) => SeriesData::Counter(c.load(Ordering::Relaxed)),
            MetricStorage::Gauge(g) => SeriesData::Gauge(g.load(Ordering::Relaxed)),
            MetricStorage::Rate(r) => {
                // Read hits first: a concurrent record bumps total before hits, so this order
                // never yields hits > total.
                let hits = r.hits.load(Ordering::Acquire);
                let total = r.total.load(Ordering::Acquire);
                SeriesData::Rate {
                    total: total.max(hits),
                    hits,
                }
            }
            MetricStorage::Trend(h) => SeriesData::Trend(h.merged()),
        }
    }
}

/// Point-in-time copy of one series, still mergeable with other series of the same metric.
#[derive(Debug, Clone)]
pub enum SeriesData {
    Counter(u64),
    Gauge(i64),
    Rate { total: u64, hits: u64 },
    Trend(TrendData),
}

impl SeriesData {
    pub(crate) fn empty(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => SeriesData::Counter(0),
            MetricKind::Gauge => SeriesData::Gauge(0),
            MetricKind::Rate => SeriesData::Rate { total: 0, hits: 0 },
            MetricKind::Trend => SeriesData::Trend(TrendData::empty()),
        }
    }

    /// Folds `other` into `self`. Gauges keep the larger value.
    pub(crate) fn merge(&mut self, other: &SeriesData) {
        match (self, other) {
            (SeriesData::Counter(a), SeriesData::Counter(b)) => *a = a.saturating_add(*b),
            (SeriesData::Gauge(a), SeriesData::Gauge(b)) => *a = (*a).max(*b),
            (
                SeriesData::Rate { total, hits },
                SeriesData::Rate {
                    total: other_total,
                    hits: other_hits,
                },
            ) => {
                *total = total.saturating_add(*other_total);
                *hits = hits.saturating_add(*other_hits);
            }
            (SeriesData::Trend(a), SeriesData::Trend(b)) => a.merge(b),
            _ => {}
        }
    }

    /// Number of samples backing this series (`None` for gauges, which have no sample count).
    pub fn samples(&self) -> Option<u64> {
        match self {
            SeriesData::Counter(v) => Some(*v),
            SeriesData::Gauge(_) => None,
            SeriesData::Rate { total, .. } => Some(*total),
            SeriesData::Trend(t) => Some(t.count()),
        }
    }

    /// Derives the reportable summary. Rates and averages are computed here, lazily.
    pub fn value(&self) -> MetricValue {
        match self {
            SeriesData::Counter(v) => MetricValue::Counter(*v),
            SeriesData::Gauge(v) => MetricValue::Gauge(*v),
            SeriesData::Rate { total, hits } => MetricValue::Rate {
                total: *total,
                hits: *hits,
                rate: (*total > 0).then(|| *hits as f64 / *total as f64),
            },
            SeriesData::Trend(t) => MetricValue::Trend(summarize_trend(t)),
        }
    }

    /// Value at quantile `q` (0..=1) in milliseconds.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        match self {
            SeriesData::Trend(t) if t.count() > 0 => {
                Some(t.hist.value_at_quantile(q.clamp(0.0, 1.0)) as f64 / MICROS_PER_MILLI)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Rate {
        total: u64,
        hits: u64,
        rate: Option<f64>,
    },
    Trend(TrendSummary),
}

/// Trend statistics, all in milliseconds. Every statistic is `None` when `count == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub stdev: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

pub(crate) fn summarize_trend(t: &TrendData) -> TrendSummary {
    let h = &t.hist;
    let count = h.len();
    let ms = |v: u64| v as f64 / MICROS_PER_MILLI;
    let q = |q: f64| (count > 0).then(|| ms(h.value_at_quantile(q)));

    TrendSummary {
        count,
        sum: t.sum_us as f64 / MICROS_PER_MILLI,
        min: (count > 0).then(|| ms(h.min())),
        max: (count > 0).then(|| ms(h.max())),
        avg: (count > 0).then(|| t.sum_us as f64 / count as f64 / MICROS_PER_MILLI),
        stdev: (count > 0).then(|| h.stdev() / MICROS_PER_MILLI),
        p50: q(0.50),
        p75: q(0.75),
        p90: q(0.90),
        p95: q(0.95),
        p99: q(0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_new_initializes_defaults() {
        match MetricStorage::new(MetricKind::Counter).read() {
            SeriesData::Counter(v) => assert_eq!(v, 0),
            other => panic!("expected counter, got {other:?}"),
        }

        match MetricStorage::new(MetricKind::Gauge).read() {
            SeriesData::Gauge(v) => assert_eq!(v, 0),
            other => panic!("expected gauge, got {other:?}"),
        }

        match MetricStorage::new(MetricKind::Rate).read().value() {
            MetricValue::Rate { total, hits, rate } => {
                assert_eq!((total, hits), (0, 0));
                assert_eq!(rate, None);
            }
            other => panic!("expected rate, got {other:?}"),
        }

        match MetricStorage::new(MetricKind::Trend).read().value() {
            MetricValue::Trend(t) => {
                assert_eq!(t.count, 0);
                assert!(t.p50.is_none());
                assert!(t.min.is_none());
                assert!(t.avg.is_none());
            }
            other => panic!("expected trend, got {other:?}"),
        }
    }

    #[test]
    fn invalid_values_are_rejected() {
        let counter = MetricStorage::new(MetricKind::Counter);
        assert!(!counter.apply(-1.0));
        assert!(!counter.apply(f64::NAN));
        assert!(counter.apply(2.4));
        assert!(matches!(counter.read(), SeriesData::Counter(2)));

        let trend = MetricStorage::new(MetricKind::Trend);
        assert!(!trend.apply(f64::INFINITY));
        assert!(!trend.apply(-0.5));
        assert!(trend.apply(0.0));
        assert_eq!(trend.read().samples(), Some(1));
    }

    #[test]
    fn trend_summary_reports_milliseconds() {
        let trend = MetricStorage::new(MetricKind::Trend);
        for v in [10.0, 20.0, 30.0] {
            assert!(trend.apply(v));
        }

        let MetricValue::Trend(t) = trend.read().value() else {
            panic!("expected trend");
        };
        assert_eq!(t.count, 3);
        assert_eq!(t.sum, 60.0);
        assert_eq!(t.avg, Some(20.0));
        assert_eq!(t.min, Some(10.0));
        assert!(t.max.is_some_and(|m| (m - 30.0).abs() < 0.05));
    }

    #[test]
    fn rate_counts_non_zero_as_hits() {
        let rate = MetricStorage::new(MetricKind::Rate);
        for v in [1.0, 0.0, 3.0, 0.0] {
            assert!(rate.apply(v));
        }
        assert_eq!(
            rate.read().value(),
            MetricValue::Rate {
                total: 4,
                hits: 2,
                rate: Some(0.5)
            }
        );
    }

    #[test]
    fn merge_combines_series() {
        let mut a = SeriesData::Rate { total: 2, hits: 1 };
        a.merge(&SeriesData::Rate { total: 2, hits: 2 });
        assert_eq!(a.samples(), Some(4));

        let mut g = SeriesData::Gauge(3);
        g.merge(&SeriesData::Gauge(7));
        assert!(matches!(g, SeriesData::Gauge(7)));
    }
}
