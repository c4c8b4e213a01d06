//! Match-domain facade over the engine.
//!
//! Callers name a category and a handful of contextual tags; the facade
//! turns that into key, TTL, tag set and compression hint.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use scorecache_core::{CacheKey, CacheKeyBuilder};

use super::engine::{CacheEngine, InvalidationReport};
use super::entry::{CacheEntry, SetOptions};
use super::strategy::{DataCategory, get_strategy};

const DOMAIN: &str = "matches";

/// Contextual tag builders. Names are lowercased so that "Arsenal" and
/// "arsenal" invalidate together.
pub mod tags {
    pub fn match_id(id: &str) -> String {
        format!("match:{id}")
    }

    pub fn team(name: &str) -> String {
        format!("team:{}", name.trim().to_lowercase())
    }

    pub fn league(name: &str) -> String {
        format!("league:{}", name.trim().to_lowercase())
    }

    pub fn date(date: &str) -> String {
        format!("date:{date}")
    }

    pub fn status(status: &str) -> String {
        format!("status:{}", status.trim().to_lowercase())
    }
}

#[derive(Clone)]
pub struct MatchCache {
    engine: Arc<CacheEngine>,
}

impl MatchCache {
    pub fn new(engine: Arc<CacheEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    pub fn key(&self, operation: &str) -> CacheKeyBuilder {
        CacheKey::builder(DOMAIN, operation)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.engine.get(key.as_str()).await
    }

    pub async fn get_entry<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        self.engine.get_entry(key.as_str()).await
    }

    /// Store under the category's strategy plus the category tag and `context_tags`.
    pub async fn put<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        category: DataCategory,
        context_tags: &[String],
    ) -> bool {
        let options = SetOptions::from_strategy(get_strategy(category))
            .with_tag(category.category_tag())
            .with_tags(context_tags.iter().cloned());
        self.engine.set(key.as_str(), value, &options).await
    }

    pub async fn remove(&self, key: &CacheKey) -> bool {
        self.engine.delete(key.as_str()).await
    }

    pub async fn invalidate_tags(&self, tags: &[String]) -> InvalidationReport {
        self.engine.clear_by_tags(tags).await
    }

    pub async fn invalidate_category(&self, category: DataCategory) -> InvalidationReport {
        self.invalidate_tags(&[category.category_tag()]).await
    }

    pub async fn invalidate_match(&self, match_id: &str) -> InvalidationReport {
        self.invalidate_tags(&[tags::match_id(match_id)]).await
    }

    pub async fn invalidate_team(&self, team: &str) -> InvalidationReport {
        self.invalidate_tags(&[tags::team(team)]).await
    }

    pub async fn invalidate_league(&self, league: &str) -> InvalidationReport {
        self.invalidate_tags(&[tags::league(league)]).await
    }

    pub async fn invalidate_date(&self, date: &str) -> InvalidationReport {
        self.invalidate_tags(&[tags::date(date)]).await
    }

    pub async fn invalidate_status(&self, status: &str) -> InvalidationReport {
        self.invalidate_tags(&[tags::status(status)]).await
    }

    /// A match changed upstream: drop its own entries and every list or count
    /// category that may include it.
    pub async fn on_match_updated(&self, match_id: &str) -> InvalidationReport {
        let mut tags = vec![tags::match_id(match_id)];
        tags.extend(
            DataCategory::ALL
                .into_iter()
                .filter(|c| get_strategy(*c).invalidate_on_update)
                .map(|c| c.category_tag()),
        );
        self.invalidate_tags(&tags).await
    }
}
