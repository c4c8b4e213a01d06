//! Composition root.
//!
//! Owns every cache component and the background tasks around them. Build
//! it once at process start, hand out the accessors, and call `shutdown` on
//! the way out.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::access::CachedMatchAccess;
use crate::admin::CacheAdmin;
use crate::cache::{CacheEngine, CacheInvalidationListener, MatchCache, RemoteSetup};
use crate::config::AppConfig;
use crate::create_remote_tier;
use crate::origin::MatchOrigin;
use crate::warming::{CacheWarmer, WarmerHandle};

pub struct CacheRuntime {
    engine: Arc<CacheEngine>,
    access: CachedMatchAccess,
    warmer: Arc<CacheWarmer>,
    admin: CacheAdmin,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    warmer_handle: WarmerHandle,
}

impl CacheRuntime {
    /// Build the tiers and services and start the sweep, invalidation
    /// listener, startup warm and background refresh tasks.
    ///
    /// An unreachable Redis does not fail startup: the engine runs on the
    /// in-process tier and health reports the remote tier as down.
    pub async fn start(config: &AppConfig, origin: Arc<dyn MatchOrigin>) -> anyhow::Result<Self> {
        config.validate().context("invalid cache configuration")?;

        let remote = create_remote_tier(&config.redis).await;
        let listen = config.redis.pubsub_enabled && matches!(remote, RemoteSetup::Ready { .. });
        let engine = Arc::new(CacheEngine::new(
            &config.cache,
            remote,
            config.redis.op_timeout(),
            config.redis.pubsub_enabled,
        ));

        let access = CachedMatchAccess::new(MatchCache::new(Arc::clone(&engine)), origin);
        let warmer = Arc::new(CacheWarmer::new(access.clone(), config.warming.clone()));
        let admin = CacheAdmin::new(Arc::clone(&engine), Arc::clone(&warmer));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = vec![
            Arc::clone(&engine).start_sweep_task(config.cache.sweep_interval(), shutdown_rx.clone()),
        ];
        if listen {
            let listener = CacheInvalidationListener {
                redis_url: config.redis.url.clone(),
                channel: config.redis.invalidation_channel.clone(),
                engine: Arc::clone(&engine),
            };
            tasks.push(listener.start(shutdown_rx));
        }
        let warmer_handle = warmer.start();

        tracing::info!(
            instance = %engine.instance_id(),
            memory = config.cache.memory_enabled,
            remote = config.redis.enabled,
            remote_connected = engine.is_remote_connected(),
            warming = config.warming.enabled,
            background_refresh = config.warming.background_refresh_enabled,
            "cache runtime started"
        );

        Ok(Self {
            engine,
            access,
            warmer,
            admin,
            shutdown,
            tasks,
            warmer_handle,
        })
    }

    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &MatchCache {
        self.access.cache()
    }

    pub fn access(&self) -> &CachedMatchAccess {
        &self.access
    }

    pub fn warmer(&self) -> &Arc<CacheWarmer> {
        &self.warmer
    }

    pub fn admin(&self) -> &CacheAdmin {
        &self.admin
    }

    /// Stop every background task and wait for them.
    pub async fn shutdown(self) {
        self.warmer_handle.shutdown().await;
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "cache task ended abnormally");
            }
        }
        tracing::info!("cache runtime stopped");
    }
}
