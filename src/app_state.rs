use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    batch::BatchCoordinator,
    ocr::EngineFactory,
    pool::{EnginePoolManager, PoolSettings},
    staging::ImageStager,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pools: Arc<EnginePoolManager>,
    pub coordinator: Arc<BatchCoordinator>,
}

impl AppState {
    pub fn new(config: &AppConfig, factory: Arc<dyn EngineFactory>) -> Self {
        let settings = PoolSettings {
            language: config.ocr_language.clone(),
            job_timeout: config.job_timeout(),
        };
        let pools = Arc::new(EnginePoolManager::new(
            factory,
            ImageStager::new(&config.staging_dir),
            settings,
        ));
        let coordinator = BatchCoordinator::new(Arc::clone(&pools), config.ocr_pool_size, config.region());

        Self {
            pools,
            coordinator: Arc::new(coordinator),
        }
    }
}
