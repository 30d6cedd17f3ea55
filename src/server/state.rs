use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::orchestrator::Orchestrator;
use crate::preview::PreviewStore;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub previews: Arc<PreviewStore>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    /// Previews render with the orchestrator's rasteriser.
    pub fn new(orchestrator: Orchestrator, config: ServiceConfig) -> Self {
        let previews = Arc::new(PreviewStore::new(Arc::clone(orchestrator.rasterizer())));
        Self {
            orchestrator,
            previews,
            config: Arc::new(config),
        }
    }
}
