//! Bounded in-memory artwork cache.
//!
//! LRU with a fixed TTL. Expired entries are evicted lazily on lookup and
//! ahead of capacity-based eviction on insert, so the cache never exceeds
//! its configured entry count. All access goes through one mutex; LRU
//! reordering makes even `get` a write.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::compute_etag;

/// One cached artwork payload.
#[derive(Debug, Clone)]
pub struct CachedArtwork {
    pub data: Vec<u8>,
    pub content_type: String,
    pub etag: String,
}

#[derive(Debug)]
struct Entry {
    expires_at: Instant,
    data: Vec<u8>,
    content_type: String,
    etag: String,
    last_used: u64,
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Monotonic counter backing recency order
    tick: u64,
}

#[derive(Debug)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
            }),
            ttl,
            max_entries,
        }
    }

    /// Look up a key. Expired entries are removed here; a hit refreshes
    /// recency order.
    pub fn get(&self, key: &str) -> Option<CachedArtwork> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let expired = matches!(inner.entries.get(key), Some(e) if now >= e.expires_at);
        if expired {
            inner.entries.remove(key);
            return None;
        }

        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(CachedArtwork {
            data: entry.data.clone(),
            content_type: entry.content_type.clone(),
            etag: entry.etag.clone(),
        })
    }

    /// Insert a payload, returning its strong etag. Enforces TTL and
    /// capacity bounds before returning.
    pub fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> String {
        let etag = compute_etag(&data);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            key.to_string(),
            Entry {
                expires_at: now + self.ttl,
                data,
                content_type: content_type.to_string(),
                etag: etag.clone(),
                last_used: tick,
            },
        );

        // Expired entries go first, then least-recently-used
        inner.entries.retain(|_, e| now < e.expires_at);
        while inner.entries.len() > self.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    inner.entries.remove(&k);
                }
                None => break,
            }
        }

        etag
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
    }

    /// Remove entries whose key matches the predicate (purge operations).
    pub fn remove_matching(&self, predicate: impl Fn(&str) -> bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.retain(|k, _| !predicate(k));
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
