//! The upstream sports-data provider, as seen by the cache.
//!
//! Implementations return the provider's raw JSON; shaping it into the
//! canonical result types is done by the access wrapper through
//! [`scorecache_core::Normalize`].

use async_trait::async_trait;
use serde_json::Value;

use scorecache_core::OriginError;

#[async_trait]
pub trait MatchOrigin: Send + Sync {
    /// Fixtures on a `yyyy-mm-dd` date (UTC).
    async fn todays_matches(&self, date: &str) -> Result<Value, OriginError>;

    async fn live_matches(&self) -> Result<Value, OriginError>;

    /// Fixtures starting within the next `days` days.
    async fn upcoming_matches(&self, days: u32) -> Result<Value, OriginError>;

    async fn match_details(&self, match_id: &str) -> Result<Value, OriginError>;

    async fn match_analysis(&self, match_id: &str) -> Result<Value, OriginError>;

    async fn match_count(&self) -> Result<Value, OriginError>;
}
