use crate::key::KeyId;
use smallvec::SmallVec;

/// Sorted `(key, value)` pairs identifying one series of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Request tags rarely exceed four pairs (method, endpoint, status, error).
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    /// Builds a tag set from pairs already sorted by key.
    pub fn from_sorted_iter(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn contains(&self, key: KeyId, value: KeyId) -> bool {
        self.tags
            .binary_search_by(|(k, v)| (*k, *v).cmp(&(key, value)))
            .is_ok()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let slice: &[(KeyId, KeyId)] = &self.tags;
        let idx = slice.partition_point(|(k, _)| *k < key);
        slice.get(idx).and_then(|(k, v)| (*k == key).then_some(*v))
    }

    /// True when every pair of `other` is present in `self`.
    pub fn contains_all(&self, other: &TagSet) -> bool {
        other.iter().all(|(k, v)| self.contains(k, v))
    }
}
