//! Cached access to the origin.
//!
//! One method per logical query. Each derives a deterministic key, serves a
//! cached value when there is one, and otherwise fetches, normalizes and
//! stores the origin's answer under the query's category.
//!
//! Origin failures are never cached. After a failed fetch the query is tried
//! once more without touching the cache; if that fails too, the caller gets
//! the type's `unavailable()` value (empty, `degraded = true`).

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use scorecache_core::{
    CacheKey, MatchAnalysis, MatchCount, MatchDetail, MatchList, Normalize, OriginError,
};

use crate::cache::{DataCategory, MatchCache, category_for_status, tags};
use crate::metrics;
use crate::origin::MatchOrigin;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Serve from cache when possible.
    #[default]
    CacheFirst,
    /// Skip the read, always fetch and overwrite. Used by warming.
    Refresh,
}

/// Category and contextual tags a fetched value is stored under.
struct Placement {
    category: DataCategory,
    tags: Vec<String>,
}

impl Placement {
    fn new(category: DataCategory) -> Self {
        Self {
            category,
            tags: Vec::new(),
        }
    }

    fn tagged(mut self, tag: String) -> Self {
        self.tags.push(tag);
        self
    }
}

#[derive(Clone)]
pub struct CachedMatchAccess {
    cache: MatchCache,
    origin: Arc<dyn MatchOrigin>,
}

impl CachedMatchAccess {
    pub fn new(cache: MatchCache, origin: Arc<dyn MatchOrigin>) -> Self {
        Self { cache, origin }
    }

    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    pub async fn todays_matches(&self, date: &str) -> MatchList {
        self.todays_matches_with(date, FetchMode::CacheFirst).await
    }

    /// `date` is `yyyy-mm-dd`; an unparseable date never reaches the origin.
    pub async fn todays_matches_with(&self, date: &str, mode: FetchMode) -> MatchList {
        let date = match scorecache_core::canonical_match_date(date) {
            Ok(date) => date,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting today's matches query");
                return MatchList::unavailable();
            }
        };
        let date = date.as_str();

        let key = self.cache.key("today").param("date", date).build();
        self.cached(
            key,
            mode,
            "todays_matches",
            || self.origin.todays_matches(date),
            |_: &mut MatchList| {
                Placement::new(DataCategory::TodayMatches).tagged(tags::date(date))
            },
        )
        .await
        .unwrap_or_else(MatchList::unavailable)
    }

    /// Today's matches for the current UTC date.
    pub async fn todays_matches_now(&self, mode: FetchMode) -> MatchList {
        match scorecache_core::today_utc() {
            Ok(date) => self.todays_matches_with(&date, mode).await,
            Err(e) => {
                tracing::error!(error = %e, "cannot determine today's date");
                MatchList::unavailable()
            }
        }
    }

    pub async fn live_matches(&self) -> MatchList {
        self.live_matches_with(FetchMode::CacheFirst).await
    }

    pub async fn live_matches_with(&self, mode: FetchMode) -> MatchList {
        let key = self.cache.key("live").build();
        self.cached(
            key,
            mode,
            "live_matches",
            || self.origin.live_matches(),
            |_: &mut MatchList| Placement::new(DataCategory::LiveMatches),
        )
        .await
        .unwrap_or_else(MatchList::unavailable)
    }

    pub async fn upcoming_matches(&self, days: u32) -> MatchList {
        self.upcoming_matches_with(days, FetchMode::CacheFirst).await
    }

    pub async fn upcoming_matches_with(&self, days: u32, mode: FetchMode) -> MatchList {
        let key = self.cache.key("upcoming").param("days", days).build();
        self.cached(
            key,
            mode,
            "upcoming_matches",
            || self.origin.upcoming_matches(days),
            |_: &mut MatchList| Placement::new(DataCategory::UpcomingMatches),
        )
        .await
        .unwrap_or_else(MatchList::unavailable)
    }

    pub async fn match_details(&self, match_id: &str) -> MatchDetail {
        self.match_details_with(match_id, FetchMode::CacheFirst)
            .await
    }

    /// Detail is stored in the TTL band of its status after normalization.
    pub async fn match_details_with(&self, match_id: &str, mode: FetchMode) -> MatchDetail {
        let key = self.cache.key("details").param("id", match_id).build();
        self.cached(
            key,
            mode,
            "match_details",
            || self.origin.match_details(match_id),
            |detail: &mut MatchDetail| detail_placement(detail, match_id),
        )
        .await
        .unwrap_or_else(|| MatchDetail::unavailable(match_id))
    }

    pub async fn match_analysis(&self, match_id: &str) -> MatchAnalysis {
        self.match_analysis_with(match_id, FetchMode::CacheFirst)
            .await
    }

    pub async fn match_analysis_with(&self, match_id: &str, mode: FetchMode) -> MatchAnalysis {
        let key = self.cache.key("analysis").param("id", match_id).build();
        self.cached(
            key,
            mode,
            "match_analysis",
            || self.origin.match_analysis(match_id),
            |analysis: &mut MatchAnalysis| {
                if analysis.match_id.is_empty() {
                    analysis.match_id = match_id.to_string();
                }
                Placement::new(DataCategory::MatchAnalysis).tagged(tags::match_id(match_id))
            },
        )
        .await
        .unwrap_or_else(|| MatchAnalysis::unavailable(match_id))
    }

    pub async fn match_count(&self) -> MatchCount {
        self.match_count_with(FetchMode::CacheFirst).await
    }

    pub async fn match_count_with(&self, mode: FetchMode) -> MatchCount {
        let key = self.cache.key("count").build();
        self.cached(
            key,
            mode,
            "match_count",
            || self.origin.match_count(),
            |_: &mut MatchCount| Placement::new(DataCategory::MatchCount),
        )
        .await
        .unwrap_or_else(MatchCount::unavailable)
    }

    async fn cached<T, F, Fut, P>(
        &self,
        key: CacheKey,
        mode: FetchMode,
        operation: &'static str,
        fetch: F,
        place: P,
    ) -> Option<T>
    where
        T: Normalize + Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value, OriginError>>,
        P: FnOnce(&mut T) -> Placement,
    {
        if mode == FetchMode::CacheFirst {
            if let Some(hit) = self.cache.get::<T>(&key).await {
                return Some(hit);
            }
        }

        match fetch_normalized::<T, _, _>(operation, &fetch).await {
            Ok(mut value) => {
                let placement = place(&mut value);
                self.cache
                    .put(&key, &value, placement.category, &placement.tags)
                    .await;
                Some(value)
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    operation,
                    error = %e,
                    "origin fetch failed, retrying without cache"
                );
                match fetch_normalized::<T, _, _>(operation, &fetch).await {
                    Ok(mut value) => {
                        place(&mut value);
                        Some(value)
                    }
                    Err(e) => {
                        tracing::error!(
                            key = %key,
                            operation,
                            error = %e,
                            "origin retry failed, returning unavailable result"
                        );
                        None
                    }
                }
            }
        }
    }
}

async fn fetch_normalized<T, F, Fut>(operation: &'static str, fetch: &F) -> Result<T, OriginError>
where
    T: Normalize,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Value, OriginError>>,
{
    let result = match fetch().await {
        Ok(raw) => T::normalize(raw).map_err(OriginError::from),
        Err(e) => Err(e),
    };
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::record_origin_request(operation, outcome);
    result
}

fn detail_placement(detail: &mut MatchDetail, match_id: &str) -> Placement {
    if detail.id.is_empty() {
        detail.id = match_id.to_string();
    }

    let status = detail.status.as_deref().unwrap_or_default();
    let mut placement =
        Placement::new(category_for_status(status)).tagged(tags::match_id(match_id));
    if !status.is_empty() {
        placement = placement.tagged(tags::status(status));
    }
    for team in [&detail.home_team, &detail.away_team].into_iter().flatten() {
        placement = placement.tagged(tags::team(team));
    }
    if let Some(league) = &detail.league {
        placement = placement.tagged(tags::league(league));
    }
    placement
}
