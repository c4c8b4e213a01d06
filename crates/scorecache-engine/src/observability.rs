//! Tracing setup for processes that embed the cache engine.
//!
//! The engine itself only emits `tracing` events; the host decides whether to
//! install this subscriber or its own.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| filter_for(&logging.level));

    let (reload_layer, handle) = reload::Layer::new(filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Swap the active filter, e.g. after a config reload.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| {
            *f = filter_for(level);
        });
    }
}

// Connection pool chatter stays at warn unless RUST_LOG says otherwise.
fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{level},redis=warn,deadpool=warn"))
}
