/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Least-recently-used resource cache.

use std::sync::Arc;

use hashlink::LruCache;
use parking_lot::Mutex;

use super::Resource;

/// Bounded LRU map from cache key to resource. A capacity of 0 means
/// unbounded.
#[derive(Debug)]
pub struct ResourceCache {
    entries: Mutex<LruCache<String, Arc<Resource>>>,
}

impl ResourceCache {
    pub fn new(capacity: usize) -> Self {
        let entries = if capacity == 0 {
            LruCache::new_unbounded()
        } else {
            LruCache::new(capacity)
        };
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Look up a resource, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<Arc<Resource>> {
        self.entries.lock().get(key).cloned()
    }

    /// Store a resource, evicting the least recently used one when full.
    pub fn put(&self, key: impl Into<String>, resource: Arc<Resource>) -> Option<Arc<Resource>> {
        self.entries.lock().insert(key.into(), resource)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Resource>> {
        self.entries.lock().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{MemoryResourceLoader, ResourceData, ResourceKind};

    fn resource(name: &str) -> Arc<Resource> {
        Arc::new(Resource::new(
            name,
            ResourceKind::Content,
            Arc::new(MemoryResourceLoader::new()),
            ResourceData::Content(Arc::from(name)),
            "UTF-8",
            0,
        ))
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = ResourceCache::new(2);
        cache.put("a", resource("a"));
        cache.put("b", resource("b"));
        assert!(cache.get("a").is_some());
        cache.put("c", resource("c"));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let cache = ResourceCache::new(0);
        for i in 0..200 {
            cache.put(format!("r{i}"), resource("r"));
        }
        assert_eq!(cache.len(), 200);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove() {
        let cache = ResourceCache::new(4);
        cache.put("a", resource("a"));
        assert!(cache.remove("a").is_some());
        assert!(cache.get("a").is_none());
    }
}
