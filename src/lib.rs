pub mod adapters;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod services;
pub mod use_cases;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ConfigHandle;
use crate::ports::EntityStore;
use crate::services::AlertManager;
use crate::use_cases::{AnalyzeTransaction, Dashboard};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub config: ConfigHandle,
    pub analyzer: AnalyzeTransaction,
    pub alerts: AlertManager,
    pub dashboard: Dashboard,
    /// Which store implementation is serving, for the health report.
    pub backend: &'static str,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>, config: ConfigHandle, backend: &'static str) -> Self {
        Self {
            analyzer: AnalyzeTransaction::new(store.clone(), config.clone()),
            alerts: AlertManager::new(store.clone(), config.clone()),
            dashboard: Dashboard::new(store.clone(), config.clone()),
            store,
            config,
            backend,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/transactions/analyze", post(handlers::transactions::analyze))
        .route("/api/transactions/:id", get(handlers::transactions::get_transaction))
        .route("/api/dashboard/stats", get(handlers::dashboard::stats))
        .route("/api/alerts", get(handlers::alerts::list_alerts))
        .route("/api/alerts/:id/review", post(handlers::alerts::begin_review))
        .route("/api/alerts/:id/resolve", post(handlers::alerts::resolve))
        .layer(cors)
        .with_state(state)
}
