use std::time::Duration;

/// Tier-level failures. These are absorbed at the engine boundary: logged,
/// counted, and turned into a miss or a skipped write.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode cache entry: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("payload compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("remote tier timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid invalidation pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },
}

impl CacheError {
    pub fn pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure says something about reachability of the remote
    /// tier, as opposed to a bad payload.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_refusal()
                    || e.is_connection_dropped()
                    || e.is_timeout()
            }
            Self::Pool(_) | Self::Timeout(_) => true,
            _ => false,
        }
    }
}
