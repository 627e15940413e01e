//! Decoded document cache.
//!
//! Entries are keyed by (normalized key, etag). A write installs a new etag,
//! so stale entries are simply never hit again and age out through eviction.
//! Uses clock eviction (approximate LRU) for low overhead.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use folio_types::Etag;
use parking_lot::Mutex;

use crate::document::JsonObject;

/// A decoded document held by a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDocument {
    /// Decoded payload.
    pub data: Arc<JsonObject>,
    /// Metadata at the cached etag.
    pub metadata: Arc<JsonObject>,
    /// Payload size in bytes, as measured when decoded.
    pub size: u64,
}

/// Cache of decoded documents shared across transactions.
///
/// Implementations must be thread-safe.
pub trait DocumentCache: Send + Sync {
    /// Returns the entry for `key` at `etag`.
    fn get(&self, key: &str, etag: Etag) -> Option<CachedDocument>;

    /// Stores the entry for `key` at `etag`.
    fn set(&self, key: &str, etag: Etag, document: CachedDocument);

    /// Drops the entry for `key` at `etag`, or every entry for `key` if `etag` is `None`.
    fn remove(&self, key: &str, etag: Option<Etag>);
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently cached.
    pub entries: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Total hits since creation.
    pub hits: u64,
    /// Total misses since creation.
    pub misses: u64,
}

type CacheKey = (String, Etag);

/// Cache entry with access tracking.
struct CacheEntry {
    document: CachedDocument,
    /// Whether the entry was read since the last clock sweep (second chance).
    accessed: bool,
}

#[derive(Default)]
struct ClockState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Insertion order walked by the clock hand.
    order: Vec<CacheKey>,
    hand: usize,
}

impl ClockState {
    /// Evicts one entry using the clock algorithm.
    fn evict_one(&mut self) {
        // Every entry gets at most one second chance, so two sweeps suffice.
        for _ in 0..self.order.len() * 2 {
            if self.hand >= self.order.len() {
                self.hand = 0;
            }
            let key = &self.order[self.hand];
            match self.entries.get_mut(key) {
                Some(entry) if entry.accessed => {
                    entry.accessed = false;
                    self.hand += 1;
                },
                _ => {
                    let key = self.order.remove(self.hand);
                    self.entries.remove(&key);
                    return;
                },
            }
        }
    }
}

/// Bounded in-memory [`DocumentCache`] with clock eviction.
///
/// A capacity of zero disables caching: `set` is a no-op and every `get` misses.
pub struct InMemoryDocumentCache {
    state: Mutex<ClockState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryDocumentCache {
    /// Creates a cache holding at most `capacity` documents.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ClockState::default()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the number of cached documents.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Checks if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all cached documents.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.hand = 0;
    }

    /// Returns cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl DocumentCache for InMemoryDocumentCache {
    fn get(&self, key: &str, etag: Etag) -> Option<CachedDocument> {
        let mut state = self.state.lock();
        match state.entries.get_mut(&(key.to_string(), etag)) {
            Some(entry) => {
                entry.accessed = true;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.document.clone())
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    fn set(&self, key: &str, etag: Etag, document: CachedDocument) {
        if self.capacity == 0 {
            return;
        }
        let cache_key = (key.to_string(), etag);
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(&cache_key) {
            entry.document = document;
            entry.accessed = true;
            return;
        }

        while state.entries.len() >= self.capacity {
            state.evict_one();
        }
        state.order.push(cache_key.clone());
        state.entries.insert(cache_key, CacheEntry { document, accessed: false });
    }

    fn remove(&self, key: &str, etag: Option<Etag>) {
        let mut state = self.state.lock();
        let ClockState { entries, order, hand } = &mut *state;
        match etag {
            Some(etag) => {
                let cache_key = (key.to_string(), etag);
                if entries.remove(&cache_key).is_some() {
                    order.retain(|k| *k != cache_key);
                }
            },
            None => {
                entries.retain(|(cached, _), _| cached != key);
                order.retain(|(cached, _)| cached != key);
            },
        }
        if *hand >= order.len() {
            *hand = 0;
        }
    }
}
