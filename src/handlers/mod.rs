pub mod alerts;
pub mod dashboard;
pub mod transactions;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::time::Duration;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
    pub backend: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let probe = tokio::time::timeout(Duration::from_secs(2), state.store.recent_alerts(1)).await;
    let store_status = match probe {
        Ok(Ok(_)) => "connected",
        Ok(Err(e)) => {
            tracing::warn!("Health check store probe failed: {}", e);
            "disconnected"
        }
        Err(_) => {
            tracing::warn!("Health check store probe timed out");
            "timeout"
        }
    };
    let healthy = store_status == "connected";

    let body = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_status.to_string(),
        backend: state.backend.to_string(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(body))
}
