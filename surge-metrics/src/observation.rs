use std::time::Instant;

/// One recorded data point.
///
/// Observations are produced by work units (or by the slot harness itself) and handed to
/// [`crate::Registry::record`] exactly once. The value is interpreted according to the kind the
/// metric was registered with:
///
/// - counter: amount to add (rounded, must be non-negative),
/// - gauge: value to store,
/// - rate: any non-zero value counts as a hit,
/// - trend: a sample in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub metric_name: String,
    pub value: f64,
    pub timestamp: Instant,
    pub tags: Vec<(String, String)>,
}

impl Observation {
    pub fn new(metric_name: impl Into<String>, value: f64) -> Self {
        Self {
            metric_name: metric_name.into(),
            value,
            timestamp: Instant::now(),
            tags: Vec::new(),
        }
    }

    /// Rate sample: `true` counts as a hit.
    pub fn flag(metric_name: impl Into<String>, hit: bool) -> Self {
        Self::new(metric_name, if hit { 1.0 } else { 0.0 })
    }

    #[must_use]
    pub fn at(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}
