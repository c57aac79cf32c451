use axum::{extract::State, routing::post, Json, Router};

use crate::models::{AppState, InvokeResponse, WorkerPayload};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/invoke", post(invoke))
        .with_state(state)
}

/// Runs the job to completion before answering; the dispatcher relies on
/// that to keep one job in flight.
///
/// The invocation runs on its own task so a caller that hangs up mid-inference
/// does not cancel it: the result is still written.
async fn invoke(
    State(state): State<AppState>,
    Json(payload): Json<WorkerPayload>,
) -> AppResult<Json<InvokeResponse>> {
    let invoker = state.invoker.clone();
    let response = tokio::spawn(async move { invoker.invoke(&payload.job_id, &payload.prompt).await })
        .await
        .map_err(|e| AppError::Internal(format!("invocation task failed: {}", e)))??;
    Ok(Json(response))
}
