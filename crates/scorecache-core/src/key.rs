//! Deterministic cache key derivation.
//!
//! Keys have the shape `domain:operation[:name=value[&name=value]*]`.
//! Parameters are sorted by name and every component is escaped, so two
//! different queries can never produce the same key and the same query
//! always produces the same key regardless of parameter order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn builder(domain: &str, operation: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            domain: domain.to_string(),
            operation: operation.to_string(),
            params: BTreeMap::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    domain: String,
    operation: String,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Add an identifying parameter. A repeated name replaces the earlier value.
    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> CacheKey {
        let mut key = String::with_capacity(64);
        escape_into(&mut key, &self.domain);
        key.push(':');
        escape_into(&mut key, &self.operation);

        if !self.params.is_empty() {
            key.push(':');
            for (i, (name, value)) in self.params.iter().enumerate() {
                if i > 0 {
                    key.push('&');
                }
                escape_into(&mut key, name);
                key.push('=');
                escape_into(&mut key, value);
            }
        }

        CacheKey(key)
    }
}

fn escape_into(out: &mut String, component: &str) {
    for ch in component.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '=' => out.push_str("%3D"),
            '&' => out.push_str("%26"),
            other => out.push(other),
        }
    }
}
