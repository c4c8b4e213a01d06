//! Data-volatility-aware strategy catalog.
//!
//! Every cached value belongs to exactly one [`DataCategory`]. The category
//! decides how long the value may be served, which base tags it carries, and
//! whether it is warmed on startup. Live data changes by the minute, finished
//! matches never change, and the TTLs follow that.

use serde::Serialize;
use std::time::Duration;

/// Everything the engine caches, by volatility class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    LiveMatches,
    TodayMatches,
    UpcomingMatches,
    MatchCount,
    LiveMatchDetails,
    UpcomingMatchDetails,
    CompletedMatchDetails,
    MatchAnalysis,
}

impl DataCategory {
    /// All categories in declaration order.
    pub const ALL: [DataCategory; 8] = [
        DataCategory::LiveMatches,
        DataCategory::TodayMatches,
        DataCategory::UpcomingMatches,
        DataCategory::MatchCount,
        DataCategory::LiveMatchDetails,
        DataCategory::UpcomingMatchDetails,
        DataCategory::CompletedMatchDetails,
        DataCategory::MatchAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::LiveMatches => "live_matches",
            DataCategory::TodayMatches => "today_matches",
            DataCategory::UpcomingMatches => "upcoming_matches",
            DataCategory::MatchCount => "match_count",
            DataCategory::LiveMatchDetails => "live_match_details",
            DataCategory::UpcomingMatchDetails => "upcoming_match_details",
            DataCategory::CompletedMatchDetails => "completed_match_details",
            DataCategory::MatchAnalysis => "match_analysis",
        }
    }

    /// Tag every entry of this category carries in addition to the base tags.
    pub fn category_tag(&self) -> String {
        format!("category:{}", self.as_str())
    }
}

impl std::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warming priority; `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Caching policy for one category. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStrategyConfig {
    pub ttl_seconds: u64,
    pub tags: &'static [&'static str],
    pub compress: bool,
    pub priority: Priority,
    pub warm_on_startup: bool,
    /// Drop every entry of the category when any match changes upstream.
    /// Per-match categories are instead dropped through their `match:{id}` tag.
    pub invalidate_on_update: bool,
}

impl CacheStrategyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

const LIVE_MATCHES: CacheStrategyConfig = CacheStrategyConfig {
    ttl_seconds: 30,
    tags: &["matches", "live"],
    compress: false,
    priority: Priority::High,
    warm_on_startup: true,
    invalidate_on_update: true,
};

const TODAY_MATCHES: CacheStrategyConfig = CacheStrategyConfig {
    ttl_seconds: 120,
    tags: &["matches", "today"],
    compress: false,
    priority: Priority::High,
    warm_on_startup: true,
    invalidate_on_update: true,
};

const UPCOMING_MATCHES: CacheStrategyConfig = CacheStrategyConfig {
    ttl_seconds: 600,
    tags: &["matches", "upcoming"],
    compress: false,
    priority: Priority::Medium,
    warm_on_startup: true,
    invalidate_on_update: true,
};

const MATCH_COUNT: CacheStrategyConfig = CacheStrategyConfig {
    ttl_seconds: 300,
    tags: &["matches", "counts"],
    compress: false,
    priority: Priority::Low,
    warm_on_startup: true,
    invalidate_on_update: true,
};

const LIVE_MATCH_DETAILS: CacheStrategyConfig = CacheStrategyConfig {
    ttl_seconds: 30,
    tags: &["match-details", "live"],
    compress: false,
    priority: Priority::High,
    warm_on_startup: false,
    invalidate_on_update: false,
};

const UPCOMING_MATCH_DETAILS: CacheStrategyConfig = CacheStrategyConfig {
    ttl_seconds: 600,
    tags: &["match-details", "upcoming"],
    compress: false,
    priority: Priority::Medium,
    warm_on_startup: false,
    invalidate_on_update: false,
};

const COMPLETED_MATCH_DETAILS: CacheStrategyConfig = CacheStrategyConfig {
    ttl_seconds: 21_600,
    tags: &["match-details", "completed"],
    compress: true,
    priority: Priority::Low,
    warm_on_startup: false,
    invalidate_on_update: false,
};

const MATCH_ANALYSIS: CacheStrategyConfig = CacheStrategyConfig {
    ttl_seconds: 1_800,
    tags: &["analysis"],
    compress: true,
    priority: Priority::Medium,
    warm_on_startup: false,
    invalidate_on_update: false,
};

/// Look up the strategy of a category.
pub fn get_strategy(category: DataCategory) -> &'static CacheStrategyConfig {
    match category {
        DataCategory::LiveMatches => &LIVE_MATCHES,
        DataCategory::TodayMatches => &TODAY_MATCHES,
        DataCategory::UpcomingMatches => &UPCOMING_MATCHES,
        DataCategory::MatchCount => &MATCH_COUNT,
        DataCategory::LiveMatchDetails => &LIVE_MATCH_DETAILS,
        DataCategory::UpcomingMatchDetails => &UPCOMING_MATCH_DETAILS,
        DataCategory::CompletedMatchDetails => &COMPLETED_MATCH_DETAILS,
        DataCategory::MatchAnalysis => &MATCH_ANALYSIS,
    }
}

const LIVE_STATUSES: &[&str] = &[
    "live",
    "in_progress",
    "in-progress",
    "inprogress",
    "in progress",
    "incomplete",
    "playing",
    "halftime",
    "half_time",
    "ht",
    "1h",
    "2h",
    "first_half",
    "second_half",
    "extra_time",
    "et",
    "break",
];

const UPCOMING_STATUSES: &[&str] = &[
    "scheduled",
    "upcoming",
    "not_started",
    "not started",
    "notstarted",
    "ns",
    "tbd",
    "timed",
    "pending",
    "fixture",
    "pre_match",
];

const COMPLETED_STATUSES: &[&str] = &[
    "complete",
    "completed",
    "finished",
    "final",
    "ft",
    "full_time",
    "aet",
    "after_extra_time",
    "pen",
    "penalties",
    "ended",
];

/// Detail category (and so TTL band) for a match status.
///
/// Case-insensitive. Anything not recognised as live or upcoming is treated
/// as completed: an unknown status is assumed to be stable.
pub fn category_for_status(status: &str) -> DataCategory {
    let status = status.trim().to_ascii_lowercase();
    if LIVE_STATUSES.contains(&status.as_str()) {
        DataCategory::LiveMatchDetails
    } else if UPCOMING_STATUSES.contains(&status.as_str()) {
        DataCategory::UpcomingMatchDetails
    } else {
        if !COMPLETED_STATUSES.contains(&status.as_str()) {
            tracing::debug!(status = %status, "unrecognised match status, using completed TTL");
        }
        DataCategory::CompletedMatchDetails
    }
}

/// TTL in seconds for a match with the given status.
pub fn ttl_for_status(status: &str) -> u64 {
    get_strategy(category_for_status(status)).ttl_seconds
}

/// Warm-on-startup categories, high priority first, ties in declaration order.
pub fn warming_order() -> Vec<DataCategory> {
    let mut order: Vec<DataCategory> = DataCategory::ALL
        .into_iter()
        .filter(|c| get_strategy(*c).warm_on_startup)
        .collect();
    // stable sort keeps declaration order within a priority
    order.sort_by_key(|c| get_strategy(*c).priority);
    order
}
