//! Hot cache: unbounded in-memory mirror of one table

use std::collections::HashMap;

use ahash::RandomState;

/// Key/value map for one table. No eviction; entries stay until removed.
#[derive(Debug, Default)]
pub(crate) struct HotCache {
    map: HashMap<String, String, RandomState>,
}

impl HotCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&String> {
        self.map.get(key)
    }

    /// Insert or overwrite, returning the previous value
    pub(crate) fn insert(&mut self, key: String, value: String) -> Option<String> {
        self.map.insert(key, value)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }
}
