//! Operations behind the administrative HTTP surface.
//!
//! Every return type is `Serialize`, so a route handler can hand it straight
//! to its JSON encoder.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::{
    CacheEngine, CacheError, CacheStrategyConfig, DataCategory, HealthReport, InvalidationReport,
    MemoryStats, get_strategy,
};
use crate::metrics::{self, CacheMetrics};
use crate::warming::{CacheWarmer, WarmError, WarmReport, WarmingState};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySummary {
    pub category: DataCategory,
    #[serde(flatten)]
    pub strategy: &'static CacheStrategyConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub metrics: CacheMetrics,
    pub hit_rate: f64,
    pub memory: Option<MemoryStats>,
    pub warming: WarmingState,
    pub strategies: Vec<StrategySummary>,
}

#[derive(Clone)]
pub struct CacheAdmin {
    engine: Arc<CacheEngine>,
    warmer: Arc<CacheWarmer>,
}

impl CacheAdmin {
    pub fn new(engine: Arc<CacheEngine>, warmer: Arc<CacheWarmer>) -> Self {
        Self { engine, warmer }
    }

    pub fn get_metrics(&self) -> CacheMetrics {
        self.engine.metrics()
    }

    /// Prometheus text exposition, when the exporter is installed.
    pub fn render_prometheus(&self) -> Option<String> {
        metrics::render_metrics()
    }

    pub async fn health_check(&self) -> HealthReport {
        self.engine.health_check().await
    }

    pub async fn force_refresh(&self) -> Result<WarmReport, WarmError> {
        self.warmer.force_refresh().await
    }

    pub async fn invalidate_by_pattern(
        &self,
        pattern: &str,
    ) -> Result<InvalidationReport, CacheError> {
        self.engine.invalidate_by_pattern(pattern).await
    }

    pub async fn invalidate_by_tags(&self, tags: &[String]) -> InvalidationReport {
        self.engine.clear_by_tags(tags).await
    }

    pub fn get_statistics(&self) -> CacheStatistics {
        let metrics = self.engine.metrics();
        CacheStatistics {
            hit_rate: metrics.hit_rate(),
            metrics,
            memory: self.engine.memory_tier().map(|m| m.stats()),
            warming: self.warmer.state(),
            strategies: DataCategory::ALL
                .into_iter()
                .map(|category| StrategySummary {
                    category,
                    strategy: get_strategy(category),
                })
                .collect(),
        }
    }
}
