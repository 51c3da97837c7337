pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use crate::config::Config;
use crate::database::question_store::{PgQuestionStore, QuestionStore};
use crate::services::{
    document_service::DocumentService, image_cache::ImageCache, import_service::ImportService,
};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub image_cache: ImageCache,
    pub import_service: ImportService,
    pub document_service: DocumentService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        Self::with_store(Arc::new(PgQuestionStore::new(pool)), config)
    }

    pub fn with_store(store: Arc<dyn QuestionStore>, config: &Config) -> Self {
        let image_cache = ImageCache::new();
        let import_service = ImportService::new(
            store.clone(),
            image_cache.clone(),
            config.asset_root.clone(),
            config.import_created_by,
            config.duplicate_policy,
        );
        let document_service = DocumentService::new(store, config.asset_root.clone());

        Self {
            image_cache,
            import_service,
            document_service,
        }
    }
}
