// Oxidized Pipeline - asynchronous document inference job pipeline

pub mod config;
pub mod documents;
pub mod gateway;
pub mod llm;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod routes;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
// Note: import specific items from types instead of a glob
// e.g., use oxidized_pipeline::types::{AppError, AppResult};

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
