//! Cache warming.
//!
//! Two independent activities:
//! - a full warm of every warm-on-startup category in priority order, run
//!   once after a startup delay and on explicit force-refresh
//! - background refresh of the most volatile queries (live, today) on a
//!   fixed interval, regardless of what is cached
//!
//! Only one full warm runs at a time; a trigger that arrives during a run is
//! rejected, not queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::access::{CachedMatchAccess, FetchMode};
use crate::cache::{DataCategory, warming_order};
use crate::config::WarmingConfig;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmTrigger {
    Startup,
    ForceRefresh,
}

impl WarmTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmTrigger::Startup => "startup",
            WarmTrigger::ForceRefresh => "force_refresh",
        }
    }

    // Startup reuses entries another instance already put in the remote tier.
    fn fetch_mode(&self) -> FetchMode {
        match self {
            WarmTrigger::Startup => FetchMode::CacheFirst,
            WarmTrigger::ForceRefresh => FetchMode::Refresh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WarmError {
    #[error("cache warming already in progress")]
    AlreadyInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryOutcome {
    pub category: DataCategory,
    pub ok: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmReport {
    pub trigger: WarmTrigger,
    pub categories: Vec<CategoryOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Warming statistics. Counts are cumulative since startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmingState {
    pub in_progress: bool,
    /// Epoch milliseconds of the last completed run.
    pub last_run_at: Option<i64>,
    pub last_duration_ms: Option<u64>,
    pub last_trigger: Option<WarmTrigger>,
    pub runs: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub background_refreshes: u64,
    pub background_refresh_failures: u64,
}

pub struct CacheWarmer {
    access: CachedMatchAccess,
    config: WarmingConfig,
    running: AtomicBool,
    state: Mutex<WarmingState>,
}

/// Clears the running flag when a warm finishes or is cancelled.
struct RunGuard<'a> {
    warmer: &'a CacheWarmer,
}

impl<'a> RunGuard<'a> {
    fn acquire(warmer: &'a CacheWarmer) -> Option<Self> {
        warmer
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        warmer.state.lock().in_progress = true;
        Some(Self { warmer })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.warmer.state.lock().in_progress = false;
        self.warmer.running.store(false, Ordering::Release);
    }
}

impl CacheWarmer {
    pub fn new(access: CachedMatchAccess, config: WarmingConfig) -> Self {
        Self {
            access,
            config,
            running: AtomicBool::new(false),
            state: Mutex::new(WarmingState::default()),
        }
    }

    pub fn state(&self) -> WarmingState {
        self.state.lock().clone()
    }

    pub fn is_warming(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Warm every warm-on-startup category, highest priority first.
    /// A failing category is logged and counted; the rest still run.
    pub async fn warm(&self, trigger: WarmTrigger) -> Result<WarmReport, WarmError> {
        let Some(_guard) = RunGuard::acquire(self) else {
            tracing::info!(trigger = trigger.as_str(), "cache warming already in progress, rejecting trigger");
            return Err(WarmError::AlreadyInProgress);
        };

        let started = Instant::now();
        let mode = trigger.fetch_mode();
        tracing::info!(trigger = trigger.as_str(), "cache warming started");

        let mut categories = Vec::new();
        for category in warming_order() {
            let category_started = Instant::now();
            let result = self.warm_category(category, mode).await;
            let duration_ms = category_started.elapsed().as_millis() as u64;

            match &result {
                Ok(()) => tracing::debug!(category = %category, duration_ms, "category warmed"),
                Err(e) => tracing::warn!(category = %category, error = %e, "category warming failed"),
            }
            categories.push(CategoryOutcome {
                category,
                ok: result.is_ok(),
                duration_ms,
                error: result.err(),
            });
        }

        let succeeded = categories.iter().filter(|c| c.ok).count();
        let failed = categories.len() - succeeded;
        let duration_ms = started.elapsed().as_millis() as u64;

        {
            let mut state = self.state.lock();
            state.runs += 1;
            state.success_count += succeeded as u64;
            state.error_count += failed as u64;
            state.last_run_at = Some(scorecache_core::now_epoch_ms());
            state.last_duration_ms = Some(duration_ms);
            state.last_trigger = Some(trigger);
        }
        metrics::record_warming_run(trigger.as_str(), failed);
        tracing::info!(
            trigger = trigger.as_str(),
            succeeded,
            failed,
            duration_ms,
            "cache warming finished"
        );

        Ok(WarmReport {
            trigger,
            categories,
            succeeded,
            failed,
            duration_ms,
        })
    }

    pub async fn force_refresh(&self) -> Result<WarmReport, WarmError> {
        self.warm(WarmTrigger::ForceRefresh).await
    }

    /// Refetch live and today's matches. Skipped while a full warm is running.
    pub async fn refresh_volatile(&self) {
        if self.is_warming() {
            tracing::debug!("full warm in progress, skipping background refresh");
            return;
        }

        let mut failures = 0u64;
        for category in [DataCategory::LiveMatches, DataCategory::TodayMatches] {
            if let Err(e) = self.warm_category(category, FetchMode::Refresh).await {
                tracing::warn!(category = %category, error = %e, "background refresh failed");
                failures += 1;
            }
        }

        let mut state = self.state.lock();
        state.background_refreshes += 1;
        state.background_refresh_failures += failures;
    }

    async fn warm_category(&self, category: DataCategory, mode: FetchMode) -> Result<(), String> {
        let degraded = match category {
            DataCategory::LiveMatches => self.access.live_matches_with(mode).await.degraded,
            DataCategory::TodayMatches => self.access.todays_matches_now(mode).await.degraded,
            DataCategory::UpcomingMatches => {
                self.access
                    .upcoming_matches_with(self.config.upcoming_days, mode)
                    .await
                    .degraded
            }
            DataCategory::MatchCount => self.access.match_count_with(mode).await.degraded,
            DataCategory::LiveMatchDetails
            | DataCategory::UpcomingMatchDetails
            | DataCategory::CompletedMatchDetails
            | DataCategory::MatchAnalysis => {
                return Err(format!("{category} is keyed per match and cannot be warmed"));
            }
        };

        if degraded {
            Err("origin unavailable".to_string())
        } else {
            Ok(())
        }
    }

    /// Spawn the startup warm and the background refresh loop, as configured.
    pub fn start(self: &Arc<Self>) -> WarmerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if self.config.enabled {
            let warmer = Arc::clone(self);
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(warmer.config.startup_delay()) => {}
                    _ = shutdown.changed() => return,
                }
                tokio::select! {
                    result = warmer.warm(WarmTrigger::Startup) => {
                        if let Err(e) = result {
                            tracing::info!(error = %e, "startup warm skipped");
                        }
                    }
                    _ = shutdown.changed() => tracing::info!("startup warm cancelled"),
                }
            }));
        }

        if self.config.background_refresh_enabled {
            let warmer = Arc::clone(self);
            let mut shutdown = shutdown_rx;
            tasks.push(tokio::spawn(async move {
                let period = warmer.config.refresh_interval();
                tracing::info!(interval_secs = period.as_secs(), "background refresh started");

                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            tokio::select! {
                                _ = warmer.refresh_volatile() => {}
                                _ = shutdown.changed() => break,
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                tracing::info!("background refresh stopped");
            }));
        }

        WarmerHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

/// Running warmer tasks. Dropping the handle also stops them, without waiting.
pub struct WarmerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WarmerHandle {
    /// Cancel the timers and wait for both tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "warmer task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEngine, MatchCache};
    use crate::config::CacheConfig;
    use crate::test_support::FakeOrigin;
    use std::time::Duration;

    fn warmer(origin: &Arc<FakeOrigin>, config: WarmingConfig) -> Arc<CacheWarmer> {
        let engine = Arc::new(CacheEngine::local(&CacheConfig::default()));
        let access = CachedMatchAccess::new(MatchCache::new(engine), origin.clone());
        Arc::new(CacheWarmer::new(access, config))
    }

    fn quiet_config() -> WarmingConfig {
        WarmingConfig {
            enabled: false,
            background_refresh_enabled: false,
            ..WarmingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_warm_runs_every_category_in_order() {
        let origin = Arc::new(FakeOrigin::default());
        let warmer = warmer(&origin, quiet_config());

        let report = warmer.warm(WarmTrigger::Startup).await.unwrap();
        let order: Vec<DataCategory> = report.categories.iter().map(|c| c.category).collect();
        assert_eq!(order, warming_order());
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 0);

        for op in ["live", "today", "upcoming", "count"] {
            assert_eq!(origin.calls(op), 1, "{op}");
        }

        let state = warmer.state();
        assert!(!state.in_progress);
        assert_eq!(state.runs, 1);
        assert_eq!(state.success_count, 4);
        assert!(state.last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_category_does_not_abort_run() {
        let origin = Arc::new(FakeOrigin::default());
        let warmer = warmer(&origin, quiet_config());
        origin.fail("live", usize::MAX);

        let report = warmer.warm(WarmTrigger::Startup).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 3);
        assert!(!report.categories[0].ok);
        assert_eq!(warmer.state().error_count, 1);
    }

    #[tokio::test]
    async fn test_force_refresh_refetches() {
        let origin = Arc::new(FakeOrigin::default());
        let warmer = warmer(&origin, quiet_config());

        warmer.warm(WarmTrigger::Startup).await.unwrap();
        warmer.warm(WarmTrigger::Startup).await.unwrap();
        assert_eq!(origin.calls("count"), 1);

        warmer.force_refresh().await.unwrap();
        assert_eq!(origin.calls("count"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_rejected() {
        let origin = Arc::new(FakeOrigin::gated());
        let warmer = warmer(&origin, quiet_config());

        let running = {
            let warmer = Arc::clone(&warmer);
            tokio::spawn(async move { warmer.warm(WarmTrigger::Startup).await })
        };
        while origin.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(warmer.state().in_progress);
        assert_eq!(
            warmer.force_refresh().await.unwrap_err(),
            WarmError::AlreadyInProgress
        );

        origin.release();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.succeeded, 4);

        let state = warmer.state();
        assert_eq!(state.runs, 1);
        assert!(!state.in_progress);
        assert_eq!(origin.calls("live"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_warm_after_delay() {
        let origin = Arc::new(FakeOrigin::default());
        let config = WarmingConfig {
            enabled: true,
            startup_delay_secs: 5,
            background_refresh_enabled: false,
            ..WarmingConfig::default()
        };
        let warmer = warmer(&origin, config);
        let handle = warmer.start();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(origin.total_calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(warmer.state().runs, 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_ticks_until_shutdown() {
        let origin = Arc::new(FakeOrigin::default());
        let config = WarmingConfig {
            enabled: false,
            background_refresh_enabled: true,
            refresh_interval_secs: 30,
            ..WarmingConfig::default()
        };
        let warmer = warmer(&origin, config);
        let handle = warmer.start();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(origin.calls("live"), 2);
        assert_eq!(origin.calls("today"), 2);
        assert_eq!(warmer.state().background_refreshes, 2);

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(origin.calls("live"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_stops_background_refresh() {
        let origin = Arc::new(FakeOrigin::default());
        let config = WarmingConfig {
            enabled: false,
            background_refresh_enabled: true,
            refresh_interval_secs: 30,
            ..WarmingConfig::default()
        };
        let warmer = warmer(&origin, config);
        drop(warmer.start());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(origin.total_calls(), 0);
        assert_eq!(warmer.state().background_refreshes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_startup_delay() {
        let origin = Arc::new(FakeOrigin::default());
        let config = WarmingConfig {
            enabled: true,
            background_refresh_enabled: false,
            ..WarmingConfig::default()
        };
        let warmer = warmer(&origin, config);
        warmer.start().shutdown().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(origin.total_calls(), 0);
    }
}
