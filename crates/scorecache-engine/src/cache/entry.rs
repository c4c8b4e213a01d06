//! Cache entries and the envelope both tiers store.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::time::Duration;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::CacheError;
use super::strategy::CacheStrategyConfig;

/// Where a value was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    Memory,
    Remote,
    Origin,
}

impl SourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Memory => "memory",
            SourceTier::Remote => "remote",
            SourceTier::Origin => "origin",
        }
    }
}

/// A decoded cache entry. Entries are never mutated, only superseded.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub written_at_epoch_ms: i64,
    pub ttl_seconds: u64,
    pub source_tier: SourceTier,
    pub compressed: bool,
    pub tags: BTreeSet<String>,
}

/// How a value is written: lifetime, tags, and whether to compress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    pub ttl: Duration,
    pub tags: BTreeSet<String>,
    pub compress: bool,
}

impl SetOptions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tags: BTreeSet::new(),
            compress: false,
        }
    }

    /// TTL, base tags and compression hint of a strategy.
    pub fn from_strategy(strategy: &CacheStrategyConfig) -> Self {
        Self {
            ttl: strategy.ttl(),
            tags: strategy.tags.iter().map(|t| t.to_string()).collect(),
            compress: strategy.compress,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }
}

/// Envelope written to both tiers: metadata plus the MessagePack-encoded
/// value, gzip-deflated when `compressed` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredEntry {
    pub written_at_ms: i64,
    pub ttl_seconds: u64,
    pub compressed: bool,
    pub tags: BTreeSet<String>,
    #[serde(with = "payload_bytes")]
    pub payload: Vec<u8>,
}

impl StoredEntry {
    pub fn encode<T: Serialize>(
        value: &T,
        options: &SetOptions,
        compression_threshold: usize,
    ) -> Result<Self, CacheError> {
        let raw = rmp_serde::to_vec_named(value)?;
        let (payload, compressed) = if options.compress && raw.len() >= compression_threshold {
            let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::fast());
            encoder.write_all(&raw)?;
            (encoder.finish()?, true)
        } else {
            (raw, false)
        };

        Ok(Self {
            written_at_ms: scorecache_core::now_epoch_ms(),
            ttl_seconds: ttl_seconds(options.ttl),
            compressed,
            tags: options.tags.clone(),
            payload,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        if self.compressed {
            let mut raw = Vec::with_capacity(self.payload.len() * 2);
            GzDecoder::new(self.payload.as_slice()).read_to_end(&mut raw)?;
            Ok(rmp_serde::from_slice(&raw)?)
        } else {
            Ok(rmp_serde::from_slice(&self.payload)?)
        }
    }

    pub fn to_entry<T: DeserializeOwned>(
        &self,
        source_tier: SourceTier,
    ) -> Result<CacheEntry<T>, CacheError> {
        Ok(CacheEntry {
            data: self.decode()?,
            written_at_epoch_ms: self.written_at_ms,
            ttl_seconds: self.ttl_seconds,
            source_tier,
            compressed: self.compressed,
            tags: self.tags.clone(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CacheError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Lifetime left at `now_ms`, or `None` once expired.
    pub fn remaining_ttl(&self, now_ms: i64) -> Option<Duration> {
        let expires_at = self
            .written_at_ms
            .saturating_add((self.ttl_seconds as i64).saturating_mul(1000));
        (expires_at > now_ms).then(|| Duration::from_millis((expires_at - now_ms) as u64))
    }

    /// Approximate in-process footprint, used for the soft memory bound.
    pub fn approx_size(&self) -> u64 {
        let tags: usize = self.tags.iter().map(String::len).sum();
        (self.payload.len() + tags + 48) as u64
    }
}

// Sub-second TTLs still get a one second remote lifetime.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// MessagePack `bin` encoding for the payload instead of an array of integers.
mod payload_bytes {
    use serde::de::{Error, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        deserializer.deserialize_byte_buf(BytesVisitor)
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a byte array")
        }

        fn visit_bytes<E: Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element::<u8>()? {
                out.push(byte);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_bytes_round_trip() {
        let options = SetOptions::new(Duration::from_secs(60)).with_tag("live");
        let value = json!({"matches": [], "nested": {"h2hMatches": [[], [1, 2]]}});

        let stored = StoredEntry::encode(&value, &options, 1024).unwrap();
        assert!(!stored.compressed);

        let bytes = stored.to_bytes().unwrap();
        let restored = StoredEntry::from_bytes(&bytes).unwrap();
        assert_eq!(restored, stored);
        assert_eq!(restored.decode::<serde_json::Value>().unwrap(), value);
    }

    #[test]
    fn test_compression_respects_threshold() {
        let big = json!({"predictions": vec!["home win"; 200]});
        let options = SetOptions::new(Duration::from_secs(60)).compressed(true);

        let stored = StoredEntry::encode(&big, &options, 64).unwrap();
        assert!(stored.compressed);
        assert_eq!(stored.decode::<serde_json::Value>().unwrap(), big);

        let small = StoredEntry::encode(&json!({"a": 1}), &options, 64).unwrap();
        assert!(!small.compressed);
    }

    #[test]
    fn test_remaining_ttl() {
        let stored = StoredEntry {
            written_at_ms: 10_000,
            ttl_seconds: 2,
            compressed: false,
            tags: BTreeSet::new(),
            payload: Vec::new(),
        };
        assert_eq!(stored.remaining_ttl(10_500), Some(Duration::from_millis(1_500)));
        assert_eq!(stored.remaining_ttl(12_000), None);
    }

    #[test]
    fn test_sub_second_ttl_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_millis(100)), 1);
        assert_eq!(ttl_seconds(Duration::from_millis(1_500)), 2);
        assert_eq!(ttl_seconds(Duration::from_secs(30)), 30);
    }

    #[test]
    fn test_options_from_strategy() {
        let strategy = super::super::strategy::get_strategy(
            super::super::strategy::DataCategory::CompletedMatchDetails,
        );
        let options = SetOptions::from_strategy(strategy).with_tag("match:7");
        assert!(options.compress);
        assert!(options.tags.contains("completed"));
        assert!(options.tags.contains("match:7"));
        assert_eq!(options.ttl, Duration::from_secs(21_600));
    }
}
