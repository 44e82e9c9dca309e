/*!
 * Storage Engine
 *
 * Composes the hash index and the recency tracker, keeps the byte counter
 * that accounts for every live key and value, and enforces the memory
 * budget on each write by evicting least-recently-used entries. Expiry is
 * an absolute instant fixed when an entry is written; a key is dead once
 * the clock passes that instant, whether the sweeper or a lookup notices
 * first.
 */

use std::time::{Duration, Instant};

use crate::hash::HashIndex;
use crate::lru::LruTracker;

/// The stored record for one key.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Opaque value bytes.
    pub value: Vec<u8>,
    /// Absolute expiry instant; `None` means the entry never expires.
    pub expires_at: Option<Instant>,
    /// Monotonic instant of the last read or write.
    pub last_accessed: Instant,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| now + d),
            last_accessed: now,
        }
    }

    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// In-memory key-value store with TTL expiry and LRU eviction under a
/// byte budget.
///
/// Every public operation leaves the index and the recency tracker holding
/// exactly the same key set, and the byte counter equal to the sum of
/// `key.len() + value.len()` over live entries, at or below the budget.
pub struct StorageEngine {
    index: HashIndex<Vec<u8>, Entry>,
    lru: LruTracker<Vec<u8>>,
    used: usize,
    max_memory: usize,
}

impl StorageEngine {
    /// Create an engine with the given byte budget.
    pub fn new(max_memory: usize) -> Self {
        Self {
            index: HashIndex::new(),
            lru: LruTracker::new(),
            used: 0,
            max_memory,
        }
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes currently accounted to live keys and values.
    #[inline]
    pub fn used_memory(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Store or replace `key`. The write always succeeds; if the entry
    /// alone exceeds the budget it is immediately evicted again and the
    /// store simply does not retain it.
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration>) {
        let now = Instant::now();
        let added = key.len() + value.len();
        let entry = Entry::new(value, ttl, now);

        if let Some(old) = self.index.insert(key.clone(), entry) {
            self.used -= key.len() + old.value.len();
        }
        self.used += added;
        self.lru.touch(key);
        self.enforce_memory_limit();
    }

    /// Fetch the value for `key`, refreshing its recency. An entry whose
    /// expiry has passed is removed here and reported as missing.
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let now = Instant::now();

        let expired = self.index.get(key)?.is_expired(now);
        if expired {
            if let Some(entry) = self.index.remove(key) {
                self.used -= key.len() + entry.value.len();
            }
            self.lru.forget(key);
            return None;
        }

        let entry = self.index.get_mut(key)?;
        entry.last_accessed = now;
        let value = entry.value.clone();
        self.lru.touch(key.to_vec());
        Some(value)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn del(&mut self, key: &[u8]) -> bool {
        match self.index.remove(key) {
            Some(entry) => {
                self.used -= key.len() + entry.value.len();
                self.lru.forget(key);
                true
            }
            None => false,
        }
    }

    /// One sweep pass: collect every expired key, then remove each from
    /// the index and the tracker, adjusting the byte counter. Returns how
    /// many entries were dropped.
    pub fn evict_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<Vec<u8>> = self
            .index
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = self.index.remove(key.as_slice()) {
                self.used -= key.len() + entry.value.len();
            }
            self.lru.forget(key.as_slice());
        }
        expired.len()
    }

    /// Evict least-recently-used entries until the counter is back under
    /// the budget. The tracker and index are mutated in lock-step by this
    /// type only, so a tracker key missing from the index means corrupted
    /// state; that fails loudly rather than ending the loop quietly.
    fn enforce_memory_limit(&mut self) {
        while self.used > self.max_memory {
            let Some(victim) = self.lru.evict_lru() else {
                break;
            };
            match self.index.remove(victim.as_slice()) {
                Some(entry) => self.used -= victim.len() + entry.value.len(),
                None => panic!("recency tracker holds key absent from index"),
            }
        }
    }
}
