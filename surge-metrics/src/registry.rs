use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::key::{Interner, KeyId};
use crate::metrics::{MetricDef, MetricKind, MetricStorage};
use crate::observation::Observation;
use crate::snapshot::{MetricSnapshot, MetricsSnapshot, SeriesSnapshot};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct RegisteredMetric {
    name: KeyId,
    kind: MetricKind,
}

#[derive(Debug)]
struct MetricEntry {
    id: MetricId,
    kind: MetricKind,
    series: DashMap<TagSet, MetricStorage>,
}

/// Thread-safe metric store.
///
/// Metric definitions are read-mostly and live behind a lock; samples go to per-series storage
/// sharded by `DashMap`, so concurrent recorders only meet when they hit the same series (and
/// even then counters and rates are plain atomics and trends are striped).
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<RegisteredMetric>>,
    storage: DashMap<KeyId, MetricEntry>,
    dropped: AtomicU64,
}

impl Registry {
    /// Registers a metric, or returns the existing id when `name` is already known with the same
    /// kind.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        if name.trim().is_empty() {
            return Err(Error::EmptyName);
        }

        let name_id = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some(entry) = self.storage.get(&name_id) {
            if entry.kind != kind {
                return Err(Error::KindMismatch {
                    name: name.to_string(),
                    registered: entry.kind,
                    requested: kind,
                });
            }
            return Ok(entry.id);
        }

        let id = MetricId(defs.len() as u32);
        defs.push(RegisteredMetric {
            name: name_id,
            kind,
        });
        self.storage.insert(
            name_id,
            MetricEntry {
                id,
                kind,
                series: DashMap::new(),
            },
        );
        Ok(id)
    }

    pub fn register_all<'a>(&self, defs: impl IntoIterator<Item = &'a MetricDef>) -> Result<()> {
        for def in defs {
            self.register(&def.name, def.kind)?;
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let key = self.interner.get(name)?;
        self.storage.get(&key).map(|e| (e.id, e.kind))
    }

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.lookup(name).map(|(_, kind)| kind)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.defs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observations rejected so far (unknown metric or value invalid for the metric kind).
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Records one observation into its `(metric, tags)` series.
    ///
    /// Returns `false` (and bumps [`Registry::dropped`]) when the metric is not registered or the
    /// value is not valid for its kind.
    pub fn record(&self, obs: &Observation) -> bool {
        let recorded = self.try_record(obs);
        if !recorded {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        recorded
    }

    fn try_record(&self, obs: &Observation) -> bool {
        let Some(name_id) = self.interner.get(&obs.metric_name) else {
            return false;
        };
        let Some(entry) = self.storage.get(&name_id) else {
            return false;
        };

        let tags = self.resolve_tags(obs.tags.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        if let Some(series) = entry.series.get(&tags) {
            return series.apply(obs.value);
        }

        let kind = entry.kind;
        let series = entry
            .series
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind));
        series.apply(obs.value)
    }

    /// Interns tag pairs into a canonical (sorted, one value per key) tag set.
    ///
    /// When a key repeats, the last value wins.
    pub fn resolve_tags<'a>(&self, tags: impl IntoIterator<Item = (&'a str, &'a str)>) -> TagSet {
        let mut resolved: Vec<(usize, KeyId, KeyId)> = tags
            .into_iter()
            .enumerate()
            .map(|(i, (k, v))| {
                (
                    i,
                    self.interner.get_or_intern(k),
                    self.interner.get_or_intern(v),
                )
            })
            .collect();

        // Later pairs sort first within a key so `dedup_by_key` keeps them.
        resolved.sort_unstable_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));
        resolved.dedup_by_key(|(_, k, _)| *k);

        TagSet::from_sorted_iter(resolved.into_iter().map(|(_, k, v)| (k, v)))
    }

    fn resolve_str(&self, id: KeyId) -> String {
        self.interner
            .resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// Point-in-time copy of every series, in registration order.
    ///
    /// Each series is read consistently on its own; series are not read at one common instant.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let defs = self.defs.read();
        let mut metrics = Vec::with_capacity(defs.len());

        for def in defs.iter() {
            let Some(entry) = self.storage.get(&def.name) else {
                continue;
            };

            let mut series: Vec<SeriesSnapshot> = entry
                .series
                .iter()
                .map(|s| SeriesSnapshot {
                    tags: s
                        .key()
                        .iter()
                        .map(|(k, v)| (self.resolve_str(k), self.resolve_str(v)))
                        .collect(),
                    data: s.value().read(),
                })
                .collect();
            series.sort_by(|a, b| a.tags.cmp(&b.tags));

            metrics.push(MetricSnapshot {
                name: self.resolve_str(def.name),
                kind: def.kind,
                series,
            });
        }

        MetricsSnapshot::new(metrics)
    }
}
