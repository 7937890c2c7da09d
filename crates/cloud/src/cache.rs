//! LRU cache for downloaded assets.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

/// LRU cache of decoded-ready asset bytes keyed by href.
///
/// Entries are shared, so a hit costs one reference count.
pub struct AssetCache {
    inner: LruCache<String, Arc<Vec<u8>>>,
}

impl AssetCache {
    /// Create a cache holding at most `capacity` assets (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, href: &str) -> Option<Arc<Vec<u8>>> {
        self.inner.get(href).cloned()
    }

    pub fn insert(&mut self, href: impl Into<String>, data: Vec<u8>) -> Arc<Vec<u8>> {
        let data = Arc::new(data);
        self.inner.put(href.into(), Arc::clone(&data));
        data
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_insert_get() {
        let mut cache = AssetCache::new(2);
        cache.insert("https://a/B5.TIF", vec![1, 2, 3]);
        assert_eq!(cache.get("https://a/B5.TIF").as_deref(), Some(&vec![1, 2, 3]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_eviction() {
        let mut cache = AssetCache::new(2);
        cache.insert("b4", vec![1]);
        cache.insert("b5", vec![2]);
        cache.insert("b6", vec![3]); // evicts b4

        assert!(cache.get("b4").is_none());
        assert!(cache.get("b5").is_some());
        assert!(cache.get("b6").is_some());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = AssetCache::new(0);
        cache.insert("x", vec![0]);
        assert_eq!(cache.len(), 1);
    }
}
