pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::SqlitePool;

use services::prober::{DirectoryProber, ScanEngine};

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: config::AppConfig,
    pub prober: Arc<dyn DirectoryProber>,
    pub engine: Arc<dyn ScanEngine>,
}
