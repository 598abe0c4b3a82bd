//! Bounded frame caches with background half-eviction.
//!
//! Each cache has a single writer (the dispatcher for the original cache,
//! the reconstructor for the render/rect caches) and any number of
//! readers. Keys are frame indices, so a `BTreeMap` gives the evictor the
//! lowest-keyed half in one range scan.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::info;
use vigil_models::FrameIndex;

/// A shared map keyed by frame index.
///
/// Cloning is shallow; all clones observe the same entries.
#[derive(Debug)]
pub struct SharedCache<V> {
    inner: Arc<RwLock<BTreeMap<FrameIndex, V>>>,
    name: &'static str,
}

impl<V> Clone for SharedCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            name: self.name,
        }
    }
}

impl<V: Clone + Send + Sync + 'static> SharedCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BTreeMap::new())),
            name,
        }
    }

    pub fn insert(&self, index: FrameIndex, value: V) {
        self.inner.write().expect("cache lock poisoned").insert(index, value);
    }

    pub fn get(&self, index: FrameIndex) -> Option<V> {
        self.inner.read().expect("cache lock poisoned").get(&index).cloned()
    }

    pub fn contains(&self, index: FrameIndex) -> bool {
        self.inner.read().expect("cache lock poisoned").contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest resident index, if any.
    pub fn min_key(&self) -> Option<FrameIndex> {
        self.inner
            .read()
            .expect("cache lock poisoned")
            .keys()
            .next()
            .copied()
    }

    /// Highest resident index, if any.
    pub fn max_key(&self) -> Option<FrameIndex> {
        self.inner
            .read()
            .expect("cache lock poisoned")
            .keys()
            .next_back()
            .copied()
    }

    /// Drop the lowest-keyed half of the entries.
    ///
    /// Halving amortizes deletion cost and keeps the newest frames, which
    /// are the ones an in-flight render task still needs.
    pub fn evict_half(&self) {
        let mut map = self.inner.write().expect("cache lock poisoned");
        let half = map.len() / 2;
        if half == 0 {
            return;
        }
        let split = match map.keys().nth(half) {
            Some(k) => *k,
            None => return,
        };
        *map = map.split_off(&split);
    }

    /// If the cache has outgrown `limit`, evict half in a background task.
    pub fn prune(&self, limit: usize) {
        if self.len() > limit {
            let cache = self.clone();
            let name = self.name;
            tokio::spawn(async move {
                cache.evict_half();
                info!("Clear half {} caches", name);
            });
        }
    }
}
