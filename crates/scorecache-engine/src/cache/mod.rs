//! Two-tier match cache: in-process (DashMap) + shared remote (Redis).

pub mod engine;
pub mod entry;
pub mod error;
pub mod facade;
pub mod memory;
pub mod pubsub;
pub mod remote;
pub mod strategy;

pub use engine::{CacheEngine, HealthReport, InvalidationReport};
pub use entry::{CacheEntry, SetOptions, SourceTier};
pub use error::CacheError;
pub use facade::{MatchCache, tags};
pub use memory::{MemoryStats, MemoryTier};
pub use pubsub::{CacheInvalidationListener, Invalidation, InvalidationMessage};
pub use remote::{RedisTier, RemoteSetup, RemoteTier};
pub use strategy::{
    CacheStrategyConfig, DataCategory, Priority, category_for_status, get_strategy,
    ttl_for_status, warming_order,
};
