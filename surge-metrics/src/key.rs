use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Interned string id used for metric names and tag keys/values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Default, Debug)]
pub(crate) struct Interner {
    inner: RwLock<InternerInner>,
}

#[derive(Default, Debug)]
struct InternerInner {
    map: AHashMap<Arc<str>, u32>,
    vec: Vec<Arc<str>>,
}

impl Interner {
    pub(crate) fn get(&self, s: &str) -> Option<KeyId> {
        self.inner.read().map.get(s).copied().map(KeyId)
    }

    pub(crate) fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.get(s) {
            return id;
        }

        let mut inner = self.inner.write();

        // Another writer may have won the race between the read and write lock.
        if let Some(&id) = inner.map.get(s) {
            return KeyId(id);
        }

        let id = inner.vec.len() as u32;
        let s: Arc<str> = Arc::from(s);
        inner.vec.push(s.clone());
        inner.map.insert(s, id);

        KeyId(id)
    }

    pub(crate) fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.inner.read().vec.get(id.0 as usize).cloned()
    }
}
