//! End-to-end scenarios through `CacheRuntime` with an in-process origin.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use scorecache_core::{MatchList, OriginError};
use scorecache_engine::cache::{DataCategory, get_strategy};
use scorecache_engine::config::AppConfig;
use scorecache_engine::{CacheRuntime, FetchMode, MatchOrigin, WarmTrigger};

#[derive(Default)]
struct CountingOrigin {
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl CountingOrigin {
    fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().entry(op).or_default() += 1;
    }
}

#[async_trait]
impl MatchOrigin for CountingOrigin {
    async fn todays_matches(&self, date: &str) -> Result<Value, OriginError> {
        self.record("today");
        Ok(json!({
            "data": [
                {"id": 1, "status": "scheduled", "homeTeam": "Ajax", "awayTeam": "PSV", "kickoff": format!("{date}T18:00:00Z")},
                {"id": 2, "status": "incomplete", "homeTeam": "Porto", "awayTeam": "Benfica"}
            ]
        }))
    }

    async fn live_matches(&self) -> Result<Value, OriginError> {
        self.record("live");
        Ok(json!([{"id": 2, "status": "incomplete"}]))
    }

    async fn upcoming_matches(&self, _days: u32) -> Result<Value, OriginError> {
        self.record("upcoming");
        Ok(json!({"matches": null}))
    }

    async fn match_details(&self, match_id: &str) -> Result<Value, OriginError> {
        self.record("details");
        Ok(json!({"data": {"id": match_id, "status": "scheduled", "predictions": "n/a"}}))
    }

    async fn match_analysis(&self, _match_id: &str) -> Result<Value, OriginError> {
        self.record("analysis");
        Err(OriginError::RateLimited {
            retry_after_secs: Some(60),
        })
    }

    async fn match_count(&self) -> Result<Value, OriginError> {
        self.record("count");
        Ok(json!("17"))
    }
}

fn quiet_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.warming.enabled = false;
    config.warming.background_refresh_enabled = false;
    config
}

#[tokio::test]
async fn cold_cache_fetches_once_per_query() {
    let origin = Arc::new(CountingOrigin::default());
    let runtime = CacheRuntime::start(&quiet_config(), origin.clone())
        .await
        .expect("runtime starts");

    let first = runtime.access().todays_matches("2025-06-16").await;
    assert_eq!(origin.calls("today"), 1);
    assert_eq!(first.total, 2);

    let key = runtime.cache().key("today").param("date", "2025-06-16").build();
    let entry = runtime
        .cache()
        .get_entry::<MatchList>(&key)
        .await
        .expect("stored after the miss");
    assert_eq!(
        entry.ttl_seconds,
        get_strategy(DataCategory::TodayMatches).ttl_seconds
    );

    let second = runtime.access().todays_matches("2025-06-16").await;
    assert_eq!(origin.calls("today"), 1);
    assert_eq!(second, first);

    let metrics = runtime.admin().get_metrics();
    // the entry inspection above counts as one of the two hits
    assert_eq!(metrics.hits, 2);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.sets, 1);

    runtime.shutdown().await;
}

#[tokio::test]
async fn malformed_payloads_are_normalized() {
    let origin = Arc::new(CountingOrigin::default());
    let runtime = CacheRuntime::start(&quiet_config(), origin.clone())
        .await
        .expect("runtime starts");

    let upcoming = runtime.access().upcoming_matches(3).await;
    assert!(upcoming.matches.is_empty());
    assert!(!upcoming.degraded);

    let detail = runtime.access().match_details("31").await;
    assert!(detail.predictions.is_empty());
    assert!(detail.h2h_matches.is_empty());

    let count = runtime.access().match_count().await;
    assert_eq!(count.total, 17);

    // Rate limited twice: unavailable, and nothing cached
    let analysis = runtime.access().match_analysis("31").await;
    assert!(analysis.degraded);
    assert_eq!(analysis.match_id, "31");
    runtime.access().match_analysis("31").await;
    assert_eq!(origin.calls("analysis"), 4);

    runtime.shutdown().await;
}

#[tokio::test]
async fn match_update_invalidates_lists_and_detail() {
    let origin = Arc::new(CountingOrigin::default());
    let runtime = CacheRuntime::start(&quiet_config(), origin.clone())
        .await
        .expect("runtime starts");

    let report = runtime.warmer().warm(WarmTrigger::Startup).await.unwrap();
    assert_eq!(report.failed, 0);
    runtime.access().match_details("2").await;

    runtime.cache().on_match_updated("2").await;

    runtime.access().live_matches().await;
    runtime.access().match_details("2").await;
    runtime.access().match_count().await;
    assert_eq!(origin.calls("live"), 2);
    assert_eq!(origin.calls("details"), 2);
    assert_eq!(origin.calls("count"), 2);

    // Refresh mode always goes to the origin
    runtime
        .access()
        .live_matches_with(FetchMode::Refresh)
        .await;
    assert_eq!(origin.calls("live"), 3);

    let stats = runtime.admin().get_statistics();
    assert_eq!(stats.warming.runs, 1);
    assert!(!stats.warming.in_progress);

    runtime.shutdown().await;
}

#[tokio::test]
async fn unreachable_redis_degrades_to_memory() {
    let origin = Arc::new(CountingOrigin::default());
    let mut config = quiet_config();
    config.redis.enabled = true;
    config.redis.url = "redis://127.0.0.1:1".to_string();
    config.redis.timeout_ms = 500;

    let runtime = CacheRuntime::start(&config, origin.clone())
        .await
        .expect("runtime starts without redis");

    let health = runtime.admin().health_check().await;
    assert!(health.memory_ok);
    assert!(!health.remote_ok);
    assert!(!health.overall);

    runtime.access().live_matches().await;
    runtime.access().live_matches().await;
    assert_eq!(origin.calls("live"), 1);
    assert!(!runtime.admin().get_metrics().remote_connected);

    runtime.shutdown().await;
}

#[tokio::test]
async fn local_only_runtime_is_healthy() {
    let origin = Arc::new(CountingOrigin::default());
    let runtime = CacheRuntime::start(&quiet_config(), origin)
        .await
        .expect("runtime starts");

    let health = runtime.admin().health_check().await;
    assert!(health.remote_ok);
    assert!(health.overall);

    runtime.shutdown().await;
}
