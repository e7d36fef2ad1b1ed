//! Memoised engine responses.
//!
//! The arc engine keeps no state between calls; this cache is the explicit,
//! injected memo layer in front of it. Entries are keyed on the dataset
//! version plus a canonical request string, so a reload never serves stale
//! arcs.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    pub dataset_version: u64,
    pub request: String,
}

impl CacheKey {
    pub fn new(dataset_version: u64, request: impl Into<String>) -> Self {
        Self {
            dataset_version,
            request: request.into(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryBudget {
    pub max_bytes: usize,
}

impl MemoryBudget {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: Bytes,
    last_used_tick: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub used_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Deterministic in-memory response cache with a byte budget.
///
/// Notes on determinism:
/// - Entries are keyed in a `BTreeMap` for stable traversal order.
/// - Eviction is LRU by `last_used_tick`, with a tie-break by key ordering.
#[derive(Debug)]
pub struct ResponseCache {
    budget: MemoryBudget,
    used_bytes: usize,
    tick: u64,
    hits: u64,
    misses: u64,
    entries: BTreeMap<CacheKey, CacheEntry>,
}

impl ResponseCache {
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            budget,
            used_bytes: 0,
            tick: 0,
            hits: 0,
            misses: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            used_bytes: self.used_bytes,
            hits: self.hits,
            misses: self.misses,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Bytes> {
        self.tick += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used_tick = self.tick;
                self.hits += 1;
                Some(entry.body.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store `body`, evicting least recently used entries to stay within
    /// budget. Bodies larger than the whole budget are not stored.
    ///
    /// Returns the evicted keys.
    pub fn insert(&mut self, key: CacheKey, body: Bytes) -> Vec<CacheKey> {
        if body.len() > self.budget.max_bytes {
            return Vec::new();
        }

        self.tick += 1;
        let bytes = body.len();
        if let Some(old) = self.entries.insert(
            key.clone(),
            CacheEntry {
                body,
                last_used_tick: self.tick,
            },
        ) {
            self.used_bytes = self.used_bytes.saturating_sub(old.body.len());
        }
        self.used_bytes += bytes;

        self.evict_as_needed(&key)
    }

    /// Like [`ResponseCache::insert`], but only when `key` was built from
    /// `current_version`.
    ///
    /// Returns `None` when the body was stale and not stored.
    pub fn insert_if_current(
        &mut self,
        key: CacheKey,
        body: Bytes,
        current_version: u64,
    ) -> Option<Vec<CacheKey>> {
        if key.dataset_version != current_version {
            return None;
        }
        Some(self.insert(key, body))
    }

    /// Drop every entry built from a dataset older than `version`.
    pub fn invalidate_before(&mut self, version: u64) -> usize {
        let before = self.entries.len();
        let mut freed = 0usize;
        self.entries.retain(|k, e| {
            let keep = k.dataset_version >= version;
            if !keep {
                freed += e.body.len();
            }
            keep
        });
        self.used_bytes = self.used_bytes.saturating_sub(freed);
        before - self.entries.len()
    }

    fn evict_as_needed(&mut self, protected: &CacheKey) -> Vec<CacheKey> {
        let mut evicted: Vec<CacheKey> = Vec::new();
        while self.used_bytes > self.budget.max_bytes {
            // The just-inserted entry fits the budget on its own, so some
            // other entry is always available here.
            let candidate = self
                .entries
                .iter()
                .filter(|(k, _)| *k != protected)
                .min_by(|(ka, ea), (kb, eb)| {
                    ea.last_used_tick
                        .cmp(&eb.last_used_tick)
                        .then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| k.clone());

            let Some(key) = candidate else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.used_bytes = self.used_bytes.saturating_sub(entry.body.len());
            }
            evicted.push(key);
        }
        evicted
    }
}
