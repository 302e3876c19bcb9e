use std::sync::Arc;

use crate::config::ConfigProvider;
use crate::engine::matching::MatchingEngine;
use crate::engine::response::ResponseGenerator;
use crate::observability::metrics::Metrics;
use crate::sources::cached::{CachedCargoSource, CachedResourceSource};
use crate::sources::{CargoSource, ResourceSource};

pub struct AppState {
    pub engine: MatchingEngine,
    pub resources: Arc<dyn ResourceSource>,
    pub responses: ResponseGenerator,
    pub config: Arc<ConfigProvider>,
    pub metrics: Metrics,
}

impl AppState {
    /// Wraps both sources in TTL caches and wires the engine on top.
    pub fn new(
        cargo: Arc<dyn CargoSource>,
        resources: Arc<dyn ResourceSource>,
        config: Arc<ConfigProvider>,
    ) -> Self {
        let metrics = Metrics::new();

        let cargo: Arc<dyn CargoSource> = Arc::new(CachedCargoSource::new(
            cargo,
            config.clone(),
            metrics.clone(),
        ));
        let resources: Arc<dyn ResourceSource> = Arc::new(CachedResourceSource::new(
            resources,
            config.clone(),
            metrics.clone(),
        ));

        Self {
            engine: MatchingEngine::new(cargo, resources.clone(), config.clone(), metrics.clone()),
            resources,
            responses: ResponseGenerator::new(),
            config,
            metrics,
        }
    }
}
