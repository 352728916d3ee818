use crate::metrics::{MetricKind, SeriesData};

/// Frozen copy of one `(metric, tags)` series.
#[derive(Debug, Clone)]
pub struct SeriesSnapshot {
    pub tags: Vec<(String, String)>,
    pub data: SeriesData,
}

impl SeriesSnapshot {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn matches(&self, selector: &[(String, String)]) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.tag(k).is_some_and(|have| have == v))
    }
}

#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub name: String,
    pub kind: MetricKind,
    pub series: Vec<SeriesSnapshot>,
}

impl MetricSnapshot {
    /// Merges every series whose tags contain all `selector` pairs.
    ///
    /// Trend histograms are merged exactly, so quantiles over the merged data are as accurate as
    /// those of a single series.
    pub fn aggregate(&self, selector: &[(String, String)]) -> SeriesData {
        let mut out = SeriesData::empty(self.kind);
        for s in self.matching(selector) {
            out.merge(&s.data);
        }
        out
    }

    pub fn matching<'a>(
        &'a self,
        selector: &'a [(String, String)],
    ) -> impl Iterator<Item = &'a SeriesSnapshot> + 'a {
        self.series.iter().filter(move |s| s.matches(selector))
    }

    pub fn total(&self) -> SeriesData {
        self.aggregate(&[])
    }
}

/// Point-in-time view of every registered metric.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    metrics: Vec<MetricSnapshot>,
}

impl MetricsSnapshot {
    pub(crate) fn new(metrics: Vec<MetricSnapshot>) -> Self {
        Self { metrics }
    }

    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Merged data for `name` restricted to `selector`; `None` when the metric is not registered.
    pub fn aggregate(&self, name: &str, selector: &[(String, String)]) -> Option<SeriesData> {
        self.get(name).map(|m| m.aggregate(selector))
    }

    pub fn counter(&self, name: &str) -> u64 {
        match self.aggregate(name, &[]) {
            Some(SeriesData::Counter(v)) => v,
            _ => 0,
        }
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        match self.aggregate(name, &[]) {
            Some(SeriesData::Gauge(v)) => Some(v),
            _ => None,
        }
    }

    pub fn series(&self, name: &str) -> &[SeriesSnapshot] {
        self.get(name).map(|m| m.series.as_slice()).unwrap_or(&[])
    }
}
