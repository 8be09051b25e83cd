//! Response cache with TTL expiry and FIFO capacity eviction.
//!
//! The store keeps previously unwrapped response payloads keyed by
//! [`RequestSignature`]. Entries expire `ttl` after insertion and are purged
//! lazily when looked up; when the store is full, the least-recently-inserted
//! entry is evicted (FIFO by insertion — overwriting an entry counts as a
//! fresh insertion). Hit and miss counters are monotonic and survive
//! [`CacheStore::clear`]; only [`CacheStore::reset_stats`] zeroes them.

use crate::signature::RequestSignature;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Snapshot of cache performance counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a fresh entry.
    pub hits: u64,
    /// Lookups that found nothing, or found an expired entry.
    pub misses: u64,
    /// Entries removed to make room at capacity.
    pub evictions: u64,
    /// Number of entries currently stored.
    pub size: usize,
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) > self.ttl
    }
}

/// In-memory response cache owned by the client.
///
/// Not internally synchronized; the client wraps it in a mutex. A capacity
/// of 0 disables the store entirely, and a zero TTL on `set` means the
/// entry is never stored.
pub struct CacheStore {
    entries: HashMap<RequestSignature, CacheEntry>,
    order: VecDeque<RequestSignature>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheStore {
    /// Creates a store holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Returns the cached value for `signature` if present and not expired.
    ///
    /// An expired entry is removed as a side effect of the lookup and
    /// counted as a miss.
    pub fn get(&mut self, signature: &RequestSignature) -> Option<Value> {
        let now = Instant::now();
        match self.entries.get(signature) {
            Some(entry) if entry.is_expired(now) => {
                tracing::debug!(signature = %signature, "cache entry expired");
                self.entries.remove(signature);
                self.remove_from_order(signature);
                self.misses += 1;
                None
            }
            Some(entry) => {
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts or overwrites an entry.
    ///
    /// A zero `ttl` disables caching for this entry; a zero-capacity store
    /// never stores anything. Overwriting moves the entry to the back of the
    /// eviction order.
    pub fn set(&mut self, signature: RequestSignature, value: Value, ttl: Duration) {
        if self.capacity == 0 || ttl.is_zero() {
            return;
        }

        if self.entries.contains_key(&signature) {
            self.remove_from_order(&signature);
        }

        self.entries.insert(
            signature.clone(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
        self.order.push_back(signature);

        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            tracing::debug!(signature = %oldest, "evicting cache entry at capacity");
            self.entries.remove(&oldest);
            self.evictions += 1;
        }
    }

    /// Removes one entry. Returns `true` if it existed.
    pub fn invalidate(&mut self, signature: &RequestSignature) -> bool {
        if self.entries.remove(signature).is_some() {
            self.remove_from_order(signature);
            true
        } else {
            false
        }
    }

    /// Removes every entry whose URL starts with `url_prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_by_prefix(&mut self, url_prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|sig, _| !sig.url().starts_with(url_prefix));
        self.order
            .retain(|sig| !sig.url().starts_with(url_prefix));
        before - self.entries.len()
    }

    /// Removes all entries. Counters are unaffected; calling this on an
    /// empty store is a no-op.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Current counters and size.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            size: self.entries.len(),
        }
    }

    /// Zeroes the hit/miss/eviction counters.
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
    }

    fn remove_from_order(&mut self, signature: &RequestSignature) {
        self.order.retain(|sig| sig != signature);
    }
}
