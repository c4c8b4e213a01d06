pub mod error;
pub mod key;
pub mod matches;
pub mod normalize;
pub mod time;

pub use error::{CoreError, OriginError, Result};
pub use key::{CacheKey, CacheKeyBuilder};
pub use matches::{MatchAnalysis, MatchCount, MatchDetail, MatchList, MatchSummary};
pub use normalize::Normalize;
pub use time::{canonical_match_date, now_epoch_ms, parse_match_date, today_utc};
