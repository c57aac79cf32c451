#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower::ServiceExt;

use oxidized_pipeline::documents::DocumentProcessor;
use oxidized_pipeline::llm::InferenceBackend;
use oxidized_pipeline::queue::{Dispatcher, InMemoryJobStore, JobStore, LocalForwarder};
use oxidized_pipeline::types::{AppError, AppResult, LLMRequest, LLMResponse, PromptInput};
use oxidized_pipeline::{AppState, Config};

pub const BOUNDARY: &str = "pipeline-test-boundary";

/// Configuration with defaults and the in-process store
pub fn test_config() -> Config {
    config_with(&[])
}

/// `test_config` with some variables overridden
pub fn config_with(overrides: &[(&str, &str)]) -> Config {
    Config::from_lookup(|key| {
        if let Some((_, value)) = overrides.iter().find(|(k, _)| *k == key) {
            return Some(value.to_string());
        }
        match key {
            "STORE_BACKEND" => Some("memory".to_string()),
            "VLLM_MODEL" => Some("test-model".to_string()),
            _ => None,
        }
    })
    .expect("test config")
}

/// Backend double: each call takes the next scripted latency (zero once the
/// script runs out) and echoes a fixed reply. Prompts containing `FAIL`
/// produce an inference error.
pub struct StubBackend {
    reply: String,
    latencies: Mutex<VecDeque<Duration>>,
    prompts: Mutex<Vec<String>>,
}

impl StubBackend {
    pub fn new(reply: &str) -> Self {
        Self::with_latencies(reply, std::iter::empty())
    }

    pub fn with_latencies(reply: &str, latencies: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            reply: reply.to_string(),
            latencies: Mutex::new(latencies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// User prompts in the order the backend was called
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl InferenceBackend for StubBackend {
    async fn create_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let prompt = match &request.input {
            PromptInput::Chat(messages) => messages.last().map(|m| m.content.clone()).unwrap_or_default(),
            PromptInput::Text(text) => text.clone(),
        };
        self.prompts.lock().await.push(prompt.clone());

        let latency = self.latencies.lock().await.pop_front().unwrap_or_default();
        tokio::time::sleep(latency).await;

        if prompt.contains("FAIL") {
            return Err(AppError::Inference("backend returned 500 Internal Server Error".to_string()));
        }
        Ok(LLMResponse {
            content: self.reply.clone(),
            finish_reason: Some("length".to_string()),
            usage: None,
        })
    }
}

/// Store whose every operation fails, as if Redis were down
pub struct UnavailableStore;

#[async_trait]
impl JobStore for UnavailableStore {
    async fn enqueue(&self, _entry: &str) -> AppResult<()> {
        Err(AppError::Store("connection refused".to_string()))
    }

    async fn dequeue_blocking(&self, _timeout: Option<Duration>) -> AppResult<Option<String>> {
        Err(AppError::Store("connection refused".to_string()))
    }

    async fn put_result(&self, _job_id: &str, _value: &str) -> AppResult<()> {
        Err(AppError::Store("connection refused".to_string()))
    }

    async fn get_result(&self, _job_id: &str) -> AppResult<Option<String>> {
        Err(AppError::Store("connection refused".to_string()))
    }

    async fn dead_letter(&self, _entry: &str) -> AppResult<bool> {
        Err(AppError::Store("connection refused".to_string()))
    }

    async fn ping(&self) -> AppResult<()> {
        Err(AppError::Store("connection refused".to_string()))
    }
}

pub fn state_with(store: Arc<dyn JobStore>, backend: Arc<dyn InferenceBackend>) -> AppState {
    AppState::new(test_config(), store, backend, Arc::new(DocumentProcessor::new()))
}

/// A single-process pipeline: combined router plus an in-process dispatcher
pub struct TestPipeline {
    pub store: Arc<InMemoryJobStore>,
    pub backend: Arc<StubBackend>,
    pub state: AppState,
    pub app: Router,
}

impl TestPipeline {
    pub fn new(backend: StubBackend) -> Self {
        Self::with_config(backend, test_config())
    }

    pub fn with_config(backend: StubBackend, config: Config) -> Self {
        let store = Arc::new(InMemoryJobStore::recording());
        let backend = Arc::new(backend);
        let state = AppState::new(config, store.clone(), backend.clone(), Arc::new(DocumentProcessor::new()));
        let app = oxidized_pipeline::create_router(state.clone());
        Self { store, backend, state, app }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.state.store.clone(),
            Arc::new(LocalForwarder::new(self.state.invoker.clone())),
            self.state.config.worker.queue_encoding,
            self.state.metrics.clone(),
        )
    }

    pub fn spawn_dispatcher(&self) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.dispatcher();
        tokio::spawn(async move { dispatcher.run().await })
    }

    pub async fn submit(&self, prompt: &str) -> String {
        let response = send(&self.app, json_request("/submit_job", serde_json::json!({ "prompt": prompt }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        body["job_id"].as_str().expect("job_id").to_string()
    }

    pub async fn result(&self, job_id: &str) -> serde_json::Value {
        let response = send(&self.app, get(&format!("/get_result/{job_id}"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await
    }

    /// Poll until the job completes, returning its result string
    pub async fn wait_for_result(&self, job_id: &str) -> String {
        loop {
            let body = self.result(job_id).await;
            if body["status"] == "completed" {
                return body["result"].as_str().unwrap_or_default().to_string();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("router is infallible")
}

pub async fn read_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Multipart body with one part; `field` is usually `file`
pub fn multipart_request(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n").as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/submit_job")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .expect("request")
}
