//! In-process (L1) tier.
//!
//! A `DashMap` of key → entry with a tag → keys secondary index. Expiry is
//! checked lazily on read and in bulk by `sweep_expired`. The store is soft
//! bounded by entry count and approximate payload bytes: when a write pushes
//! it over either bound, expired entries go first, then the entries closest
//! to expiry.
//!
//! Operations never await; they are safe to call from any task.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use regex::Regex;
use tokio::time::Instant;

use super::entry::StoredEntry;

struct MemoryEntry {
    stored: Arc<StoredEntry>,
    expires_at: Instant,
    size: u64,
}

/// Snapshot of the in-process tier for statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub entries: usize,
    pub tags: usize,
    pub usage_bytes: u64,
    pub max_entries: usize,
    pub max_bytes: u64,
}

pub struct MemoryTier {
    entries: DashMap<String, MemoryEntry>,
    tag_index: DashMap<String, HashSet<String>>,
    usage_bytes: AtomicU64,
    max_entries: usize,
    max_bytes: u64,
}

impl MemoryTier {
    pub fn new(max_entries: usize, max_bytes: u64) -> Self {
        Self {
            entries: DashMap::new(),
            tag_index: DashMap::new(),
            usage_bytes: AtomicU64::new(0),
            max_entries: max_entries.max(1),
            max_bytes: max_bytes.max(1),
        }
    }

    /// Live entry for `key`. An expired entry is dropped and reported absent.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<StoredEntry>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(Arc::clone(&entry.stored));
            }
        }

        // Only remove what is still expired; a concurrent writer may have replaced it.
        if let Some((_, expired)) = self.entries.remove_if(key, |_, e| e.expires_at <= now) {
            self.forget(key, &expired);
        }
        None
    }

    pub(crate) fn insert(&self, key: &str, stored: Arc<StoredEntry>, ttl: Duration) {
        let size = stored.approx_size() + key.len() as u64;
        let tags: Vec<String> = stored.tags.iter().cloned().collect();
        let entry = MemoryEntry {
            stored,
            expires_at: Instant::now() + ttl,
            size,
        };

        // Bytes are counted before the entry is visible to other writers.
        self.usage_bytes.fetch_add(size, Ordering::Relaxed);
        if let Some(previous) = self.entries.insert(key.to_string(), entry) {
            self.forget(key, &previous);
        }
        for tag in tags {
            self.tag_index.entry(tag).or_default().insert(key.to_string());
        }

        self.enforce_bound();
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.forget(key, &entry);
                true
            }
            None => false,
        }
    }

    /// Remove every entry carrying at least one of `tags`.
    pub fn clear_by_tags(&self, tags: &[String]) -> usize {
        let mut keys = HashSet::new();
        for tag in tags {
            if let Some(tagged) = self.tag_index.get(tag) {
                keys.extend(tagged.iter().cloned());
            }
        }
        keys.iter().filter(|key| self.remove(key)).count()
    }

    pub fn remove_matching(&self, pattern: &Regex) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| pattern.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.iter().filter(|key| self.remove(key)).count()
    }

    /// Drop all expired entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.expires_at <= now)
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if let Some((_, entry)) = self.entries.remove_if(&key, |_, e| e.expires_at <= now) {
                self.forget(&key, &entry);
                removed += 1;
            }
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.tag_index.clear();
        self.usage_bytes.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn usage_bytes(&self) -> u64 {
        self.usage_bytes.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            entries: self.entries.len(),
            tags: self.tag_index.len(),
            usage_bytes: self.usage_bytes(),
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
        }
    }

    fn over_bound(&self) -> bool {
        self.entries.len() > self.max_entries || self.usage_bytes() > self.max_bytes
    }

    fn enforce_bound(&self) {
        if !self.over_bound() {
            return;
        }

        let expired = self.sweep_expired();
        if !self.over_bound() {
            tracing::debug!(expired, "memory tier back under bound after sweep");
            return;
        }

        let mut by_expiry: Vec<(Instant, String)> = self
            .entries
            .iter()
            .map(|e| (e.expires_at, e.key().clone()))
            .collect();
        by_expiry.sort();

        let mut evicted = 0;
        for (_, key) in by_expiry {
            if !self.over_bound() {
                break;
            }
            if self.remove(&key) {
                evicted += 1;
            }
        }
        tracing::debug!(
            expired,
            evicted,
            entries = self.entries.len(),
            usage_bytes = self.usage_bytes(),
            "memory tier soft bound enforced"
        );
    }

    fn forget(&self, key: &str, entry: &MemoryEntry) {
        let _ = self
            .usage_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                Some(used.saturating_sub(entry.size))
            });
        for tag in &entry.stored.tags {
            let now_empty = match self.tag_index.get_mut(tag) {
                Some(mut keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.tag_index.remove_if(tag, |_, keys| keys.is_empty());
            }
        }
    }
}
