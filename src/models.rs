use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::config::Config;
use crate::documents::DocumentPreprocessor;
use crate::gateway::Gateway;
use crate::llm::{InferenceBackend, RequestTemplate};
use crate::metrics::PipelineMetrics;
use crate::queue::{JobStore, WorkerInvoker};

/// Shared state for every HTTP role. Each role mounts only the routes it
/// serves, but all of them are built from the same pieces.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn JobStore>,
    pub gateway: Arc<Gateway>,
    pub invoker: Arc<WorkerInvoker>,
    pub metrics: Arc<PipelineMetrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn JobStore>,
        backend: Arc<dyn InferenceBackend>,
        preprocessor: Arc<dyn DocumentPreprocessor>,
    ) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let gateway = Arc::new(Gateway::new(
            store.clone(),
            preprocessor,
            config.worker.queue_encoding,
            metrics.clone(),
        ));
        let invoker = Arc::new(WorkerInvoker::new(
            backend,
            store.clone(),
            RequestTemplate::from_config(&config),
            metrics.clone(),
        ));

        Self {
            config: Arc::new(config),
            store,
            gateway,
            invoker,
            metrics,
        }
    }
}

// API Request/Response types

#[derive(Debug, serde::Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    /// Seconds spent turning an uploaded document into text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

/// Body of `POST /invoke`, sent by the dispatcher
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkerPayload {
    pub job_id: String,
    pub prompt: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InvokeResponse {
    pub status: String,
    pub inference_time: f64,
}

impl InvokeResponse {
    pub fn processed(inference_time: Duration) -> Self {
        Self {
            status: "processed".to_string(),
            inference_time: inference_time.as_secs_f64(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub store: String,
}
