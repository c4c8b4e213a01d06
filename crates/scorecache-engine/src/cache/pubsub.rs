//! Redis Pub/Sub for cross-instance invalidation.
//!
//! Every delete, tag clear and pattern clear is broadcast after it is applied
//! locally. Listeners on other instances drop the same keys from their
//! in-process tier; the remote tier is shared and already consistent.
//!
//! ```text
//! Instance 1: clear_by_tags(["live"])
//!   ↓
//! PUBLISH scorecache:invalidate {"instance":"…","invalidation":{"tags":["live"]}}
//!   ↓
//! Instance 2: listener → memory.clear_by_tags(["live"])
//! Instance 1: listener → ignores its own message
//! ```
//!
//! Delivery is best-effort: a message published while a listener is
//! reconnecting is lost and that instance serves the stale entry until TTL.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::engine::CacheEngine;

const MAX_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Invalidation {
    Keys(Vec<String>),
    Tags(Vec<String>),
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub instance: Uuid,
    pub invalidation: Invalidation,
}

/// Subscribes to the invalidation channel and applies foreign messages to
/// the local engine. Reconnects with exponential backoff.
pub struct CacheInvalidationListener {
    pub redis_url: String,
    pub channel: String,
    pub engine: Arc<CacheEngine>,
}

impl CacheInvalidationListener {
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);

            loop {
                let result = tokio::select! {
                    result = self.run() => result,
                    _ = shutdown.changed() => break,
                };

                match result {
                    Ok(()) => backoff = Duration::from_secs(1),
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "cache invalidation listener error, reconnecting"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = shutdown.changed() => break,
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
            tracing::info!("cache invalidation listener stopped");
        })
    }

    async fn run(&self) -> Result<(), String> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = %self.channel, "subscribed to cache invalidation channel");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload = match msg.get_payload::<String>() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read invalidation payload");
                    continue;
                }
            };
            match serde_json::from_str::<InvalidationMessage>(&payload) {
                Ok(message) => {
                    self.engine.apply_invalidation(&message);
                }
                Err(e) => tracing::warn!(error = %e, "ignoring malformed invalidation message"),
            }
        }
        Err("pub/sub connection closed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let message = InvalidationMessage {
            instance: Uuid::nil(),
            invalidation: Invalidation::Tags(vec!["live".into()]),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "instance": "00000000-0000-0000-0000-000000000000",
                "invalidation": {"tags": ["live"]}
            })
        );
        let back: InvalidationMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }
}
