pub mod access;
pub mod admin;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod origin;
pub mod runtime;
pub mod warming;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

pub use access::{CachedMatchAccess, FetchMode};
pub use admin::{CacheAdmin, CacheStatistics};
pub use cache::{CacheEngine, DataCategory, HealthReport, MatchCache};
pub use config::AppConfig;
pub use origin::MatchOrigin;
pub use runtime::CacheRuntime;
pub use warming::{CacheWarmer, WarmError, WarmReport, WarmTrigger, WarmingState};

use cache::{RedisTier, RemoteSetup};
use config::RedisConfig;

/// Build the remote tier from configuration.
///
/// Disabled Redis yields [`RemoteSetup::Disabled`]. When Redis is enabled but
/// the pool cannot be built the tier is [`RemoteSetup::Unavailable`]; when the
/// first connection fails the tier starts disconnected and the engine's sweep
/// keeps trying it.
pub async fn create_remote_tier(config: &RedisConfig) -> RemoteSetup {
    use std::time::Duration;

    if !config.enabled {
        tracing::info!("Redis disabled, using in-process cache only");
        return RemoteSetup::Disabled;
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create Redis pool, remote tier unavailable");
            return RemoteSetup::Unavailable;
        }
    };

    let connected = match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            true
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis, serving from in-process tier until it recovers"
            );
            false
        }
    };

    let tier = RedisTier::new(
        pool,
        config.key_prefix.clone(),
        config.tag_index_ttl_secs,
        config.invalidation_channel.clone(),
    );
    RemoteSetup::Ready {
        tier: Arc::new(tier),
        connected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_disabled_redis_is_not_configured() {
        let setup = block_on(create_remote_tier(&RedisConfig::default()));
        assert!(matches!(setup, RemoteSetup::Disabled));
        assert!(!setup.is_configured());
    }

    #[tokio::test]
    async fn test_unparseable_url_is_unavailable() {
        let config = RedisConfig {
            enabled: true,
            url: "not a redis url".into(),
            ..RedisConfig::default()
        };
        let setup = create_remote_tier(&config).await;
        assert!(matches!(setup, RemoteSetup::Unavailable));
    }
}
