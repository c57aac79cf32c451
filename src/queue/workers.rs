// Worker invoker: runs one job against the inference backend and records the outcome

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

use crate::llm::{InferenceBackend, RequestTemplate};
use crate::metrics::PipelineMetrics;
use crate::models::InvokeResponse;
use crate::queue::JobStore;
use crate::types::{AppError, AppResult};

pub struct WorkerInvoker {
    backend: Arc<dyn InferenceBackend>,
    store: Arc<dyn JobStore>,
    template: RequestTemplate,
    metrics: Arc<PipelineMetrics>,
}

impl WorkerInvoker {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        store: Arc<dyn JobStore>,
        template: RequestTemplate,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            backend,
            store,
            template,
            metrics,
        }
    }

    /// Run inference for one job and write its result record.
    ///
    /// A backend failure is not an error here: it becomes an `Error: ...`
    /// result so the job still reads as completed. Only a failure to write the
    /// result itself is returned.
    pub async fn invoke(&self, job_id: &str, prompt: &str) -> AppResult<InvokeResponse> {
        info!(
            job_id,
            output_tokens = self.template.output_tokens,
            prompt_len = prompt.len(),
            "Worker received job"
        );

        let request = self.template.build(prompt);
        let started = Instant::now();
        let outcome = self.backend.create_completion(&request).await;
        let inference_time = started.elapsed();

        let result = match outcome {
            Ok(response) => {
                self.metrics.record_completed();
                format_summary(inference_time, &response.content)
            }
            Err(e) => {
                error!(job_id, error = %e, "Inference failed");
                self.metrics.record_failed();
                format_error(&e)
            }
        };

        self.store.put_result(job_id, &result).await?;
        info!(job_id, inference_time = inference_time.as_secs_f64(), "Result stored");

        Ok(InvokeResponse::processed(inference_time))
    }
}

/// `Inference Time: 1.2345s | Output Length: 42 chars`
pub fn format_summary(inference_time: Duration, generated: &str) -> String {
    format!(
        "Inference Time: {:.4}s | Output Length: {} chars",
        inference_time.as_secs_f64(),
        generated.chars().count()
    )
}

pub fn format_error(err: &AppError) -> String {
    format!("Error: {}", err)
}
