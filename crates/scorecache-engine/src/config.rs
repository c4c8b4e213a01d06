use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// In-process tier configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Remote (Redis) tier configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Startup warming and background refresh
    #[serde(default)]
    pub warming: WarmingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        // Cache validations
        if self.cache.max_entries == 0 {
            return Err(ConfigError::validation("cache.max_entries must be > 0"));
        }
        if self.cache.max_memory_bytes == 0 {
            return Err(ConfigError::validation("cache.max_memory_bytes must be > 0"));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::validation("cache.sweep_interval_secs must be > 0"));
        }
        // Redis validations
        if self.redis.enabled {
            if self.redis.url.trim().is_empty() {
                return Err(ConfigError::validation("redis.enabled=true requires redis.url"));
            }
            if self.redis.pool_size == 0 {
                return Err(ConfigError::validation("redis.pool_size must be > 0"));
            }
            if self.redis.op_timeout_ms == 0 {
                return Err(ConfigError::validation("redis.op_timeout_ms must be > 0"));
            }
        }
        // Warming validations
        if self.warming.background_refresh_enabled && self.warming.refresh_interval_secs == 0 {
            return Err(ConfigError::validation(
                "warming.refresh_interval_secs must be > 0 when background refresh is enabled",
            ));
        }
        if !(1..=14).contains(&self.warming.upcoming_days) {
            return Err(ConfigError::validation(
                "warming.upcoming_days must be between 1 and 14",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// In-process (L1) cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disable to run remote-only (mostly useful in tests)
    #[serde(default = "default_memory_enabled")]
    pub memory_enabled: bool,

    /// Soft bound on the number of in-process entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Soft bound on in-process payload bytes
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: u64,

    /// How often expired in-process entries are swept (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Payloads smaller than this are never compressed
    #[serde(default = "default_compression_threshold_bytes")]
    pub compression_threshold_bytes: usize,
}

fn default_memory_enabled() -> bool {
    true
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_memory_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_compression_threshold_bytes() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_enabled: default_memory_enabled(),
            max_entries: default_max_entries(),
            max_memory_bytes: default_max_memory_bytes(),
            sweep_interval_secs: default_sweep_interval_secs(),
            compression_threshold_bytes: default_compression_threshold_bytes(),
        }
    }
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Redis configuration for the shared remote tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis. When enabled but unreachable the remote tier reports unhealthy.
    /// Default: false (single-instance deployments)
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound for a single get/set/delete round trip
    #[serde(default = "default_redis_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// Prefix for every key this service writes
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,

    /// Lifetime of the tag -> keys index sets (seconds)
    #[serde(default = "default_tag_index_ttl_secs")]
    pub tag_index_ttl_secs: u64,

    /// Broadcast invalidations to other instances over Pub/Sub
    #[serde(default = "default_pubsub_enabled")]
    pub pubsub_enabled: bool,

    /// Pub/Sub channel used for invalidation broadcasts
    #[serde(default = "default_invalidation_channel")]
    pub invalidation_channel: String,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_redis_op_timeout_ms() -> u64 {
    250
}

fn default_redis_key_prefix() -> String {
    "scorecache:".to_string()
}

fn default_tag_index_ttl_secs() -> u64 {
    86_400
}

fn default_pubsub_enabled() -> bool {
    true
}

fn default_invalidation_channel() -> String {
    "scorecache:invalidate".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            op_timeout_ms: default_redis_op_timeout_ms(),
            key_prefix: default_redis_key_prefix(),
            tag_index_ttl_secs: default_tag_index_ttl_secs(),
            pubsub_enabled: default_pubsub_enabled(),
            invalidation_channel: default_invalidation_channel(),
        }
    }
}

impl RedisConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Startup warming and background refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmingConfig {
    /// Warm the cache once after startup
    #[serde(default = "default_warming_enabled")]
    pub enabled: bool,

    /// Delay before the startup warm begins (seconds)
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,

    /// Periodically refetch live and today's matches
    #[serde(default = "default_background_refresh_enabled")]
    pub background_refresh_enabled: bool,

    /// Background refresh period (seconds)
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Look-ahead window used when warming upcoming matches
    #[serde(default = "default_upcoming_days")]
    pub upcoming_days: u32,
}

fn default_warming_enabled() -> bool {
    true
}

fn default_startup_delay_secs() -> u64 {
    5
}

fn default_background_refresh_enabled() -> bool {
    true
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_upcoming_days() -> u32 {
    3
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            enabled: default_warming_enabled(),
            startup_delay_secs: default_startup_delay_secs(),
            background_refresh_enabled: default_background_refresh_enabled(),
            refresh_interval_secs: default_refresh_interval_secs(),
            upcoming_days: default_upcoming_days(),
        }
    }
}

impl WarmingConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

pub mod loader {
    use super::{AppConfig, ConfigError};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("scorecache.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., SCORECACHE__REDIS__ENABLED=true
        builder = builder.add_source(
            Environment::with_prefix("SCORECACHE")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: AppConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(!cfg.redis.enabled);
        assert!(cfg.cache.memory_enabled);
        assert_eq!(cfg.redis.op_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_enabled_redis_without_url() {
        let mut cfg = AppConfig::default();
        cfg.redis.enabled = true;
        cfg.redis.url = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_upcoming_days() {
        let mut cfg = AppConfig::default();
        cfg.warming.upcoming_days = 0;
        assert!(cfg.validate().is_err());
        cfg.warming.upcoming_days = 15;
        assert!(cfg.validate().is_err());
    }
}
