// Hand-off from the dispatcher to a worker

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use super::jobs::Job;
use super::workers::WorkerInvoker;
use crate::models::{InvokeResponse, WorkerPayload};
use crate::types::{AppError, AppResult};

#[async_trait]
pub trait JobForwarder: Send + Sync {
    /// Deliver a job to a worker and wait for it to be processed.
    async fn forward(&self, job: &Job) -> AppResult<InvokeResponse>;
}

/// Posts jobs to a worker's `/invoke` endpoint.
pub struct HttpForwarder {
    client: Client,
    worker_url: String,
}

impl HttpForwarder {
    pub fn new(worker_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            worker_url: worker_url.into(),
        }
    }
}

#[async_trait]
impl JobForwarder for HttpForwarder {
    async fn forward(&self, job: &Job) -> AppResult<InvokeResponse> {
        let payload = WorkerPayload {
            job_id: job.id.clone(),
            prompt: job.payload.clone(),
        };

        let response = self
            .client
            .post(&self.worker_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("failed to reach worker at {}: {}", self.worker_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Transport(format!("worker returned {}: {}", status, body)));
        }

        response
            .json::<InvokeResponse>()
            .await
            .map_err(|e| AppError::Transport(format!("unreadable worker response: {}", e)))
    }
}

/// Calls a worker invoker in the same process.
pub struct LocalForwarder {
    invoker: Arc<WorkerInvoker>,
}

impl LocalForwarder {
    pub fn new(invoker: Arc<WorkerInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl JobForwarder for LocalForwarder {
    async fn forward(&self, job: &Job) -> AppResult<InvokeResponse> {
        self.invoker.invoke(&job.id, &job.payload).await
    }
}
