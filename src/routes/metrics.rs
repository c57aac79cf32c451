use axum::{extract::State, routing::get, Json, Router};

use crate::metrics::MetricsSnapshot;
use crate::models::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/metrics", get(metrics))
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
