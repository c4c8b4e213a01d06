//! In-memory fakes for the origin and the remote tier.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::watch;

use scorecache_core::OriginError;

use crate::cache::{CacheError, RemoteTier};
use crate::origin::MatchOrigin;

fn connection_refused() -> CacheError {
    CacheError::Redis(redis::RedisError::from(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "fake remote is down",
    )))
}

/// Remote tier over a mutex-guarded map. Ignores TTLs.
#[derive(Default)]
pub struct FakeRemote {
    entries: Mutex<HashMap<String, (Vec<u8>, BTreeSet<String>)>>,
    published: Mutex<Vec<String>>,
    down: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl FakeRemote {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Delay every call by `latency` before answering.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().clone()
    }

    async fn check(&self) -> Result<(), CacheError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.down.load(Ordering::SeqCst) {
            Err(connection_refused())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteTier for FakeRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check().await?;
        Ok(self.entries.lock().get(key).map(|(bytes, _)| bytes.clone()))
    }

    async fn set(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _ttl_seconds: u64,
        tags: &BTreeSet<String>,
    ) -> Result<(), CacheError> {
        self.check().await?;
        self.entries
            .lock()
            .insert(key.to_string(), (bytes, tags.clone()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.check().await?;
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn clear_by_tags(&self, tags: &[String]) -> Result<usize, CacheError> {
        self.check().await?;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (_, entry_tags)| !tags.iter().any(|t| entry_tags.contains(t)));
        Ok(before - entries.len())
    }

    async fn delete_matching(&self, glob: &str) -> Result<usize, CacheError> {
        self.check().await?;
        let regex = crate::cache::engine::glob_to_regex(glob)?;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !regex.is_match(key));
        Ok(before - entries.len())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check().await
    }

    async fn publish(&self, message: &str) -> Result<(), CacheError> {
        self.check().await?;
        self.published.lock().push(message.to_string());
        Ok(())
    }
}

/// Origin returning canned payloads and counting calls per operation.
#[derive(Default)]
pub struct FakeOrigin {
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: Mutex<HashMap<&'static str, usize>>,
    details: Mutex<HashMap<String, Value>>,
    gate: Option<watch::Sender<bool>>,
    gated_calls: AtomicUsize,
}

impl FakeOrigin {
    /// Origin whose calls block until `release` is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(watch::channel(false).0),
            ..Self::default()
        }
    }

    /// Open the gate for every pending and future call.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.send_replace(true);
        }
    }

    /// Number of calls currently blocked on the gate.
    pub fn waiting(&self) -> usize {
        self.gated_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Make the next `times` calls of `op` fail. `usize::MAX` fails forever.
    pub fn fail(&self, op: &'static str, times: usize) {
        self.failing.lock().insert(op, times);
    }

    pub fn with_detail(self, match_id: &str, detail: Value) -> Self {
        self.details.lock().insert(match_id.to_string(), detail);
        self
    }

    async fn call(&self, op: &'static str, value: Value) -> Result<Value, OriginError> {
        *self.calls.lock().entry(op).or_default() += 1;

        if let Some(gate) = &self.gate {
            let mut open = gate.subscribe();
            self.gated_calls.fetch_add(1, Ordering::SeqCst);
            let _ = open.wait_for(|open| *open).await;
            self.gated_calls.fetch_sub(1, Ordering::SeqCst);
        }

        {
            let mut failing = self.failing.lock();
            if let Some(remaining) = failing.get_mut(op) {
                if *remaining > 0 {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    return Err(OriginError::status(503, "upstream unavailable"));
                }
            }
        }
        Ok(value)
    }
}

pub fn fixture(id: u32, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "homeTeam": "Arsenal",
        "awayTeam": "Chelsea",
        "league": "Premier League",
        "kickoff": "2025-06-16T19:00:00Z"
    })
}

#[async_trait]
impl MatchOrigin for FakeOrigin {
    async fn todays_matches(&self, date: &str) -> Result<Value, OriginError> {
        let matches = vec![fixture(1, "scheduled"), fixture(2, "complete")];
        self.call("today", json!({"date": date, "data": matches, "total": 2}))
            .await
    }

    async fn live_matches(&self) -> Result<Value, OriginError> {
        self.call("live", json!([fixture(3, "incomplete")])).await
    }

    async fn upcoming_matches(&self, days: u32) -> Result<Value, OriginError> {
        let matches: Vec<Value> = (0..days).map(|d| fixture(100 + d, "scheduled")).collect();
        self.call("upcoming", json!({"matches": matches})).await
    }

    async fn match_details(&self, match_id: &str) -> Result<Value, OriginError> {
        let detail = self
            .details
            .lock()
            .get(match_id)
            .cloned()
            .unwrap_or_else(|| json!({"id": match_id, "status": "complete"}));
        self.call("details", json!({"data": detail})).await
    }

    async fn match_analysis(&self, match_id: &str) -> Result<Value, OriginError> {
        self.call(
            "analysis",
            json!({"matchId": match_id, "predictions": [{"outcome": "home"}]}),
        )
        .await
    }

    async fn match_count(&self) -> Result<Value, OriginError> {
        self.call("count", json!({"total": 12, "live": 2, "upcoming": 6, "completed": 4}))
            .await
    }
}
