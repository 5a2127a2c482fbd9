use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::error::AppError;
use crate::use_cases::TransactionInput;
use crate::AppState;

pub async fn analyze(
    State(state): State<AppState>,
    Json(input): Json<TransactionInput>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.analyzer.execute(input).await?;
    Ok(Json(result))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.analyzer.fetch(&id).await?;
    Ok(Json(tx))
}
