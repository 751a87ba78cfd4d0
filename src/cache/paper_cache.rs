use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::Paper;

/// Thread-safe LRU cache of fetched papers
///
/// Keyed by normalized PaperID. One cache lives for the duration of a single
/// graph build so sibling branches of the traversal never refetch the same
/// paper; it is shared by reference across the concurrent lookups of a level.
pub struct PaperCache {
    cache: Mutex<LruCache<String, Paper>>,
    hits: AtomicUsize,
}

impl PaperCache {
    /// Create a new paper cache with the specified capacity
    ///
    /// A capacity of 0 is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(cap)),
            hits: AtomicUsize::new(0),
        }
    }

    /// Get a cached paper by normalized id
    pub fn get(&self, paper_id: &str) -> Option<Paper> {
        let found = self
            .cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(paper_id).cloned());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Store a paper under `paper_id`
    pub fn put(&self, paper_id: String, paper: Paper) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(paper_id, paper);
        }
    }

    /// Store a paper under its own id
    pub fn insert(&self, paper: &Paper) {
        self.put(paper.paper_id.clone(), paper.clone());
    }

    /// Number of lookups answered from the cache
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get the current number of cached entries
    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}
