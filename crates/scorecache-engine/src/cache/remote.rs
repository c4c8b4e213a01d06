//! Shared (L2) tier.
//!
//! The engine talks to the remote store through [`RemoteTier`]; [`RedisTier`]
//! is the production implementation on a deadpool connection pool.
//!
//! Redis layout:
//!
//! ```text
//! {prefix}key:{cache key}  -> encoded StoredEntry, EX = entry TTL
//! {prefix}tag:{tag}        -> SET of "{prefix}key:{cache key}" members, EX = tag_index_ttl
//! ```
//!
//! Tag sets may hold members that already expired; deleting a missing key is
//! a no-op, so stale members only cost a round trip.

use std::collections::BTreeSet;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use super::error::CacheError;

/// Key/value operations the engine needs from a shared store.
///
/// Keys are logical cache keys; implementations apply their own namespacing.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(
        &self,
        key: &str,
        bytes: Vec<u8>,
        ttl_seconds: u64,
        tags: &BTreeSet<String>,
    ) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete every key indexed under any of `tags`. Returns the number of keys removed.
    async fn clear_by_tags(&self, tags: &[String]) -> Result<usize, CacheError>;

    /// Delete keys matching a glob where `*` and `?` are the only wildcards.
    async fn delete_matching(&self, glob: &str) -> Result<usize, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    /// Broadcast an invalidation message to other instances.
    async fn publish(&self, message: &str) -> Result<(), CacheError>;
}

/// Outcome of building the remote tier at startup.
pub enum RemoteSetup {
    /// Remote tier disabled by configuration.
    Disabled,
    /// Enabled, but no client could be built. Reported unhealthy.
    Unavailable,
    /// A client exists; `connected` is the result of the first ping.
    Ready {
        tier: std::sync::Arc<dyn RemoteTier>,
        connected: bool,
    },
}

impl RemoteSetup {
    pub fn is_configured(&self) -> bool {
        !matches!(self, RemoteSetup::Disabled)
    }
}

pub struct RedisTier {
    pool: Pool,
    prefix: String,
    tag_index_ttl_secs: u64,
    channel: String,
}

impl RedisTier {
    pub fn new(
        pool: Pool,
        prefix: impl Into<String>,
        tag_index_ttl_secs: u64,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            tag_index_ttl_secs: tag_index_ttl_secs.max(1),
            channel: channel.into(),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    fn data_key(&self, key: &str) -> String {
        format!("{}key:{}", self.prefix, key)
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}tag:{}", self.prefix, tag)
    }
}

#[async_trait]
impl RemoteTier for RedisTier {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.pool.get().await?;
        let bytes: Option<Vec<u8>> = conn.get(self.data_key(key)).await?;
        Ok(bytes)
    }

    async fn set(
        &self,
        key: &str,
        bytes: Vec<u8>,
        ttl_seconds: u64,
        tags: &BTreeSet<String>,
    ) -> Result<(), CacheError> {
        let data_key = self.data_key(key);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(&data_key, bytes, ttl_seconds.max(1))
            .ignore();
        for tag in tags {
            let tag_key = self.tag_key(tag);
            pipe.sadd(&tag_key, &data_key)
                .ignore()
                .expire(&tag_key, self.tag_index_ttl_secs as i64)
                .ignore();
        }

        let mut conn = self.pool.get().await?;
        let _: () = pipe.query_async(&mut conn).await?;
        tracing::debug!(key = %key, ttl_secs = ttl_seconds, tags = tags.len(), "remote set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.pool.get().await?;
        let removed: usize = conn.del(self.data_key(key)).await?;
        Ok(removed > 0)
    }

    async fn clear_by_tags(&self, tags: &[String]) -> Result<usize, CacheError> {
        if tags.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.get().await?;

        let mut members = BTreeSet::new();
        let mut tag_keys = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag_key = self.tag_key(tag);
            let keys: Vec<String> = conn.smembers(&tag_key).await?;
            members.extend(keys);
            tag_keys.push(tag_key);
        }

        let mut removed = 0;
        if !members.is_empty() {
            let keys: Vec<String> = members.into_iter().collect();
            removed = conn.del(keys).await?;
        }
        let _: usize = conn.del(tag_keys).await?;

        tracing::debug!(tags = ?tags, removed, "remote tag clear");
        Ok(removed)
    }

    async fn delete_matching(&self, glob: &str) -> Result<usize, CacheError> {
        let pattern = format!(
            "{}{}",
            escape_redis_glob(&self.data_key("")),
            escape_redis_glob_body(glob)
        );
        let mut conn = self.pool.get().await?;

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        let mut removed = 0;
        for chunk in keys.chunks(500) {
            let deleted: usize = conn.del(chunk.to_vec()).await?;
            removed += deleted;
        }
        tracing::debug!(pattern = %pattern, removed, "remote pattern delete");
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn publish(&self, message: &str) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        conn.publish::<_, _, ()>(&self.channel, message).await?;
        Ok(())
    }
}

/// Escape every Redis glob metacharacter.
fn escape_redis_glob(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\' | '^') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Keep `*` and `?` as wildcards, escape the rest.
fn escape_redis_glob_body(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len());
    for ch in glob.chars() {
        if matches!(ch, '[' | ']' | '\\' | '^') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
