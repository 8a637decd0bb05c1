pub mod config;
pub mod db;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use sqlx::PgPool;

use services::cache::SnippetCache;
use services::evaluator::ProcessEvaluator;
use services::store::PgStore;

/// Shared application state passed to all Axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: PgStore,
    pub cache: SnippetCache,
    pub evaluator: ProcessEvaluator,
    pub config: config::AppConfig,
}

impl AppState {
    pub fn new(db: PgPool, cache: SnippetCache, config: config::AppConfig) -> Self {
        let evaluator = ProcessEvaluator::new(
            config.php_binary.clone(),
            std::time::Duration::from_secs(config.eval_timeout_secs),
        );
        Self {
            store: PgStore::new(db.clone()),
            db,
            cache,
            evaluator,
            config,
        }
    }
}
