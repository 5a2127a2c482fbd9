use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::Resolution;
use crate::error::AppError;
use crate::use_cases::dashboard::DEFAULT_ALERT_LIMIT;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub limit: Option<i64>,
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> Result<impl IntoResponse, AppError> {
    let alerts = state
        .dashboard
        .recent_alerts(query.limit.unwrap_or(DEFAULT_ALERT_LIMIT))
        .await?;
    Ok(Json(alerts))
}

pub async fn begin_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let alert = state.alerts.begin_review(id).await?;
    Ok(Json(alert))
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(resolution): Json<Resolution>,
) -> Result<impl IntoResponse, AppError> {
    let alert = state.alerts.resolve(id, resolution).await?;
    Ok(Json(alert))
}
