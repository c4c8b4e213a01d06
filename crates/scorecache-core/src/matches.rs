//! Canonical result types returned to API consumers.
//!
//! Every sequence field is guaranteed to be a (possibly empty) `Vec`, never
//! absent or null. Fields the upstream sends that are not modelled here are
//! kept verbatim in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalize::{count, match_seq, optional_text, seq_or_empty, text_or_number};

/// One fixture as it appears in list responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    #[serde(default, deserialize_with = "text_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub home_team: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub away_team: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub league: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub kickoff: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of the today/live/upcoming list queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchList {
    #[serde(default, deserialize_with = "match_seq")]
    pub matches: Vec<MatchSummary>,
    #[serde(default, deserialize_with = "count")]
    pub total: u64,
    #[serde(default)]
    pub degraded: bool,
}

impl MatchList {
    /// Well-shaped empty result returned when the origin cannot be reached.
    pub fn unavailable() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }
}

/// Full detail of a single match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetail {
    #[serde(default, deserialize_with = "text_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub home_team: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub away_team: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub league: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub kickoff: Option<String>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub h2h_matches: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub recent_matches: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub home_team_stats: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub away_team_stats: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub predictions: Vec<Value>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchDetail {
    pub fn unavailable(match_id: &str) -> Self {
        Self {
            id: match_id.to_string(),
            degraded: true,
            ..Self::default()
        }
    }
}

/// Pre-match analysis: form, head-to-head, per-team stats and predictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAnalysis {
    #[serde(default, deserialize_with = "text_or_number")]
    pub match_id: String,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub h2h_matches: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub home_recent_matches: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub away_recent_matches: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub home_team_stats: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub away_team_stats: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub predictions: Vec<Value>,
    #[serde(default, deserialize_with = "seq_or_empty")]
    pub key_factors: Vec<Value>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchAnalysis {
    pub fn unavailable(match_id: &str) -> Self {
        Self {
            match_id: match_id.to_string(),
            degraded: true,
            ..Self::default()
        }
    }
}

/// Match totals by state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCount {
    #[serde(default, deserialize_with = "count")]
    pub total: u64,
    #[serde(default, deserialize_with = "count")]
    pub live: u64,
    #[serde(default, deserialize_with = "count")]
    pub upcoming: u64,
    #[serde(default, deserialize_with = "count")]
    pub completed: u64,
    #[serde(default)]
    pub degraded: bool,
}

impl MatchCount {
    pub fn unavailable() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }
}
