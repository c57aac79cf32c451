//! HTTP routes
//!
//! Each process role mounts a subset:
//! - ingest: `/submit_job`, `/get_result/{job_id}`
//! - worker: `/invoke`
//! - all: both of the above
//!
//! `/api/health` and `/api/metrics` are mounted everywhere.

pub mod health;
pub mod jobs;
pub mod metrics;
pub mod worker;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::apply_cors;
use crate::models::AppState;

/// Gateway routes for the ingest role
pub fn ingest_router(state: AppState) -> Router {
    info!("Creating ingest router");
    finish(jobs::router(state.clone()), state)
}

/// Invoke route for the worker role
pub fn worker_router(state: AppState) -> Router {
    info!("Creating worker router");
    finish(worker::router(state.clone()), state)
}

/// Gateway and worker routes on one listener
pub fn create_router(state: AppState) -> Router {
    info!("Creating combined router");
    let routes = Router::new()
        .merge(jobs::router(state.clone()))
        .merge(worker::router(state.clone()));
    finish(routes, state)
}

fn finish(routes: Router, state: AppState) -> Router {
    let router = routes
        .merge(health::router(state.clone()))
        .merge(metrics::router(state.clone()))
        .layer(TraceLayer::new_for_http());
    apply_cors(router, &state.config.server.cors_allowed_origins)
}
