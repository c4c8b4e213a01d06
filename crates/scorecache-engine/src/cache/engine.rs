//! Two-tier cache-aside engine.
//!
//! ## Lookup order
//!
//! 1. In-process tier: synchronous, never awaits
//! 2. Remote tier, when configured and connected; a hit is backfilled into
//!    the in-process tier for the rest of its remote lifetime
//! 3. Miss. The engine never calls the origin itself
//!
//! Writes go to every enabled tier independently. A failing tier is logged
//! and counted; it never fails the other tier and never reaches the caller.
//!
//! A remote failure that looks like lost connectivity flips the tier to
//! disconnected. While disconnected, lookups and writes skip it; `sweep` and
//! `health_check` ping it and flip it back.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::entry::{CacheEntry, SetOptions, SourceTier, StoredEntry};
use super::error::CacheError;
use super::memory::MemoryTier;
use super::pubsub::{Invalidation, InvalidationMessage};
use super::remote::{RemoteSetup, RemoteTier};
use crate::config::CacheConfig;
use crate::metrics::{self, CacheCounters, CacheMetrics};

/// Tier health as reported to the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub memory_ok: bool,
    pub remote_ok: bool,
    pub overall: bool,
}

/// Keys removed per tier by a bulk invalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationReport {
    pub memory_removed: usize,
    pub remote_removed: usize,
}

struct RemoteHandle {
    tier: Arc<dyn RemoteTier>,
    connected: AtomicBool,
    op_timeout: Duration,
    broadcast: bool,
}

pub struct CacheEngine {
    memory: Option<Arc<MemoryTier>>,
    remote: Option<RemoteHandle>,
    remote_configured: bool,
    counters: CacheCounters,
    compression_threshold: usize,
    instance_id: Uuid,
}

impl CacheEngine {
    /// Build an engine over an optional in-process tier and the remote setup.
    ///
    /// `op_timeout` bounds every remote round trip; `broadcast` publishes
    /// invalidations for other instances.
    pub fn new(
        cache: &CacheConfig,
        remote: RemoteSetup,
        op_timeout: Duration,
        broadcast: bool,
    ) -> Self {
        let memory = cache
            .memory_enabled
            .then(|| Arc::new(MemoryTier::new(cache.max_entries, cache.max_memory_bytes)));
        let remote_configured = remote.is_configured();
        let remote = match remote {
            RemoteSetup::Ready { tier, connected } => Some(RemoteHandle {
                tier,
                connected: AtomicBool::new(connected),
                op_timeout,
                broadcast,
            }),
            RemoteSetup::Disabled | RemoteSetup::Unavailable => None,
        };
        metrics::set_remote_connected(
            remote
                .as_ref()
                .is_some_and(|r| r.connected.load(Ordering::Relaxed)),
        );

        Self {
            memory,
            remote,
            remote_configured,
            counters: CacheCounters::default(),
            compression_threshold: cache.compression_threshold_bytes,
            instance_id: Uuid::new_v4(),
        }
    }

    /// In-process only engine with default bounds.
    pub fn local(cache: &CacheConfig) -> Self {
        Self::new(cache, RemoteSetup::Disabled, Duration::from_millis(250), false)
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn memory_tier(&self) -> Option<&Arc<MemoryTier>> {
        self.memory.as_ref()
    }

    pub fn is_remote_connected(&self) -> bool {
        self.remote
            .as_ref()
            .is_some_and(|r| r.connected.load(Ordering::Relaxed))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_entry(key).await.map(|entry| entry.data)
    }

    /// Like `get`, with entry metadata including the serving tier.
    pub async fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let started = std::time::Instant::now();
        let entry = self.lookup(key).await;
        self.counters.record_lookup_time(started.elapsed());

        match &entry {
            Some(entry) => {
                tracing::debug!(key = %key, tier = entry.source_tier.as_str(), "cache hit");
                self.counters.record_hit(entry.source_tier);
            }
            None => {
                tracing::debug!(key = %key, "cache miss");
                self.counters.record_miss();
            }
        }
        entry
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        if let Some(memory) = &self.memory {
            if let Some(stored) = memory.get(key) {
                match stored.to_entry(SourceTier::Memory) {
                    Ok(entry) => return Some(entry),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "dropping undecodable in-process entry");
                        self.counters.record_error(SourceTier::Memory, "decode");
                        memory.remove(key);
                    }
                }
            }
        }

        let remote = self.connected_remote()?;
        let bytes = self.guarded(remote, "get", remote.tier.get(key)).await??;
        let stored = match StoredEntry::from_bytes(&bytes) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "undecodable remote entry");
                self.counters.record_error(SourceTier::Remote, "decode");
                return None;
            }
        };

        let remaining = stored.remaining_ttl(scorecache_core::now_epoch_ms())?;
        let entry = match stored.to_entry(SourceTier::Remote) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "undecodable remote payload");
                self.counters.record_error(SourceTier::Remote, "decode");
                return None;
            }
        };

        if let Some(memory) = &self.memory {
            memory.insert(key, Arc::new(stored), remaining);
        }
        Some(entry)
    }

    /// Write `value` to every available tier. Returns whether any tier took it.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, options: &SetOptions) -> bool {
        let stored = match StoredEntry::encode(value, options, self.compression_threshold) {
            Ok(stored) => Arc::new(stored),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to encode cache entry");
                self.counters.record_error(SourceTier::Memory, "encode");
                return false;
            }
        };

        let mut written = false;
        if let Some(memory) = &self.memory {
            memory.insert(key, Arc::clone(&stored), options.ttl);
            written = true;
        }

        if let Some(remote) = self.connected_remote() {
            match stored.to_bytes() {
                Ok(bytes) => {
                    let set = remote
                        .tier
                        .set(key, bytes, stored.ttl_seconds, &stored.tags);
                    if self.guarded(remote, "set", set).await.is_some() {
                        written = true;
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "failed to encode remote entry");
                    self.counters.record_error(SourceTier::Remote, "encode");
                }
            }
        }

        if written {
            self.counters.record_set();
            tracing::debug!(
                key = %key,
                ttl_secs = stored.ttl_seconds,
                compressed = stored.compressed,
                "cache set"
            );
        }
        written
    }

    /// Remove `key` from both tiers. Returns whether any tier held it.
    pub async fn delete(&self, key: &str) -> bool {
        let mut removed = self.memory.as_ref().is_some_and(|m| m.remove(key));
        if let Some(remote) = self.connected_remote() {
            removed |= self
                .guarded(remote, "delete", remote.tier.delete(key))
                .await
                .unwrap_or(false);
        }

        self.counters.record_delete();
        self.broadcast(Invalidation::Keys(vec![key.to_string()]))
            .await;
        removed
    }

    /// Remove every entry whose tags intersect `tags`, in both tiers.
    pub async fn clear_by_tags(&self, tags: &[String]) -> InvalidationReport {
        if tags.is_empty() {
            return InvalidationReport::default();
        }

        let memory_removed = self.memory.as_ref().map_or(0, |m| m.clear_by_tags(tags));
        let remote_removed = match self.connected_remote() {
            Some(remote) => self
                .guarded(remote, "clear_by_tags", remote.tier.clear_by_tags(tags))
                .await
                .unwrap_or(0),
            None => 0,
        };

        tracing::info!(tags = ?tags, memory_removed, remote_removed, "cleared cache by tags");
        self.counters.record_delete();
        self.broadcast(Invalidation::Tags(tags.to_vec())).await;
        InvalidationReport {
            memory_removed,
            remote_removed,
        }
    }

    /// Remove keys matching a glob (`*` any run, `?` one character) in both tiers.
    pub async fn invalidate_by_pattern(
        &self,
        pattern: &str,
    ) -> Result<InvalidationReport, CacheError> {
        let regex = glob_to_regex(pattern)?;

        let memory_removed = self
            .memory
            .as_ref()
            .map_or(0, |m| m.remove_matching(&regex));
        let remote_removed = match self.connected_remote() {
            Some(remote) => self
                .guarded(remote, "delete_matching", remote.tier.delete_matching(pattern))
                .await
                .unwrap_or(0),
            None => 0,
        };

        tracing::info!(pattern = %pattern, memory_removed, remote_removed, "cleared cache by pattern");
        self.counters.record_delete();
        self.broadcast(Invalidation::Pattern(pattern.to_string()))
            .await;
        Ok(InvalidationReport {
            memory_removed,
            remote_removed,
        })
    }

    /// Apply an invalidation published by another instance to the in-process tier.
    /// Returns `false` for this instance's own messages.
    pub fn apply_invalidation(&self, message: &InvalidationMessage) -> bool {
        if message.instance == self.instance_id {
            return false;
        }
        let Some(memory) = &self.memory else {
            return true;
        };

        let removed = match &message.invalidation {
            Invalidation::Keys(keys) => keys.iter().filter(|k| memory.remove(k)).count(),
            Invalidation::Tags(tags) => memory.clear_by_tags(tags),
            Invalidation::Pattern(pattern) => match glob_to_regex(pattern) {
                Ok(regex) => memory.remove_matching(&regex),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring invalid broadcast pattern");
                    0
                }
            },
        };
        tracing::debug!(
            from = %message.instance,
            removed,
            "applied cross-instance invalidation"
        );
        true
    }

    /// `overall` is the conjunction of both tiers. A tier that was never
    /// configured is healthy; a configured but unreachable one is not.
    pub async fn health_check(&self) -> HealthReport {
        let memory_ok = true;
        let remote_ok = if !self.remote_configured {
            true
        } else {
            match &self.remote {
                Some(remote) => self.ping(remote).await,
                None => false,
            }
        };

        HealthReport {
            memory_ok,
            remote_ok,
            overall: memory_ok && remote_ok,
        }
    }

    /// Drop expired in-process entries and refresh the remote connection flag.
    /// Returns the number of entries swept.
    pub async fn sweep(&self) -> usize {
        let swept = match &self.memory {
            Some(memory) => {
                let swept = memory.sweep_expired();
                metrics::set_memory_gauges(memory.len(), memory.usage_bytes());
                swept
            }
            None => 0,
        };

        if let Some(remote) = &self.remote {
            self.ping(remote).await;
        }

        if swept > 0 {
            tracing::debug!(swept, "swept expired cache entries");
        }
        swept
    }

    /// Run `sweep` every `period` until `shutdown` flips.
    pub fn start_sweep_task(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
            tracing::debug!("cache sweep task stopped");
        })
    }

    pub fn metrics(&self) -> CacheMetrics {
        let usage = self.memory.as_ref().map_or(0, |m| m.usage_bytes());
        self.counters.snapshot(usage, self.is_remote_connected())
    }

    fn connected_remote(&self) -> Option<&RemoteHandle> {
        self.remote
            .as_ref()
            .filter(|r| r.connected.load(Ordering::Relaxed))
    }

    async fn ping(&self, remote: &RemoteHandle) -> bool {
        let ok = matches!(
            tokio::time::timeout(remote.op_timeout, remote.tier.ping()).await,
            Ok(Ok(()))
        );
        let was = remote.connected.swap(ok, Ordering::Relaxed);
        if was != ok {
            if ok {
                tracing::info!("remote cache tier reconnected");
            } else {
                tracing::warn!("remote cache tier unreachable");
            }
            metrics::set_remote_connected(ok);
        }
        ok
    }

    /// Run a remote call under the op timeout, absorbing its failure.
    async fn guarded<T, F>(&self, remote: &RemoteHandle, op: &'static str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let result = match tokio::time::timeout(remote.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(remote.op_timeout)),
        };

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.counters.record_error(SourceTier::Remote, op);
                if e.is_connectivity() {
                    if remote.connected.swap(false, Ordering::Relaxed) {
                        metrics::set_remote_connected(false);
                    }
                    tracing::warn!(op, error = %e, "remote cache tier unavailable, serving in-process only");
                } else {
                    tracing::warn!(op, error = %e, "remote cache operation failed");
                }
                None
            }
        }
    }

    async fn broadcast(&self, invalidation: Invalidation) {
        let Some(remote) = self.connected_remote().filter(|r| r.broadcast) else {
            return;
        };
        let message = InvalidationMessage {
            instance: self.instance_id,
            invalidation,
        };
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode invalidation message");
                return;
            }
        };
        self.guarded(remote, "publish", remote.tier.publish(&payload))
            .await;
    }
}

/// Translate a `*`/`?` glob into an anchored regex; every other character is literal.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    if pattern.trim().is_empty() {
        return Err(CacheError::pattern(pattern, "pattern is empty"));
    }

    // (?s): Redis globs match newlines too
    let mut source = String::with_capacity(pattern.len() + 12);
    source.push_str("(?s)^");
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| CacheError::pattern(pattern, e))
}
