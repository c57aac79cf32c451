//! Submission/Result Gateway
//!
//! Issues job ids, enqueues jobs and answers result lookups. Submission never
//! waits for inference; a job id is only returned once its entry is in the
//! queue.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::documents::{DocumentPreprocessor, DocumentUpload};
use crate::metrics::PipelineMetrics;
use crate::queue::{Job, JobStore, QueueEncoding};
use crate::types::AppResult;

/// What a client sees when polling a job.
///
/// There is no "unknown job" state: an id that was never issued and a job that
/// has not finished both read as `Pending`. A completed job may carry an
/// `Error: ...` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed { result: String },
}

#[derive(Debug, Clone)]
pub struct SubmittedDocument {
    pub job_id: String,
    pub processing_time: Duration,
}

pub struct Gateway {
    store: Arc<dyn JobStore>,
    preprocessor: Arc<dyn DocumentPreprocessor>,
    encoding: QueueEncoding,
    metrics: Arc<PipelineMetrics>,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn JobStore>,
        preprocessor: Arc<dyn DocumentPreprocessor>,
        encoding: QueueEncoding,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            preprocessor,
            encoding,
            metrics,
        }
    }

    /// Enqueue a text payload and return its new job id.
    pub async fn submit(&self, payload: impl Into<String>) -> AppResult<String> {
        let job = Job::new(payload);
        self.store.enqueue(&self.encoding.encode(&job)).await?;
        self.metrics.record_submitted();

        info!(job_id = %job.id, payload_len = job.payload.len(), "Job submitted");
        Ok(job.id)
    }

    /// Extract text from an uploaded document, then submit it. The returned
    /// processing time covers extraction only.
    pub async fn submit_document(&self, upload: &DocumentUpload) -> AppResult<SubmittedDocument> {
        let started = Instant::now();
        let text = self.preprocessor.extract_text(upload).await?;
        let processing_time = started.elapsed();
        debug!(chars = text.chars().count(), ?processing_time, "Document preprocessed");

        let job_id = self.submit(text).await?;
        Ok(SubmittedDocument {
            job_id,
            processing_time,
        })
    }

    pub async fn lookup(&self, job_id: &str) -> AppResult<JobStatus> {
        Ok(match self.store.get_result(job_id).await? {
            Some(result) => JobStatus::Completed { result },
            None => JobStatus::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobStore;
    use crate::types::AppError;
    use async_trait::async_trait;

    /// Preprocessor double returning canned text
    struct CannedText(&'static str);

    #[async_trait]
    impl DocumentPreprocessor for CannedText {
        async fn extract_text(&self, _upload: &DocumentUpload) -> AppResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct Unreadable;

    #[async_trait]
    impl DocumentPreprocessor for Unreadable {
        async fn extract_text(&self, _upload: &DocumentUpload) -> AppResult<String> {
            Err(AppError::Preprocessing("encrypted PDF".to_string()))
        }
    }

    fn gateway(store: Arc<InMemoryJobStore>, preprocessor: Arc<dyn DocumentPreprocessor>) -> Gateway {
        Gateway::new(store, preprocessor, QueueEncoding::Legacy, Arc::new(PipelineMetrics::new()))
    }

    fn pdf_upload() -> DocumentUpload {
        DocumentUpload::new(Some("doc.pdf".into()), Some("application/pdf".into()), "%PDF")
    }

    #[tokio::test]
    async fn test_submit_enqueues_encoded_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let gateway = gateway(store.clone(), Arc::new(CannedText("")));

        let job_id = gateway.submit("hello").await.unwrap();

        assert!(uuid::Uuid::parse_str(&job_id).is_ok());
        assert_eq!(store.pending_entries().await, vec![format!("{job_id}|hello")]);
    }

    #[tokio::test]
    async fn test_submissions_get_distinct_ids() {
        let store = Arc::new(InMemoryJobStore::new());
        let gateway = gateway(store.clone(), Arc::new(CannedText("")));

        let first = gateway.submit("same").await.unwrap();
        let second = gateway.submit("same").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.pending_entries().await.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_pending_then_completed() {
        let store = Arc::new(InMemoryJobStore::new());
        let gateway = gateway(store.clone(), Arc::new(CannedText("")));

        let job_id = gateway.submit("hello").await.unwrap();
        assert_eq!(gateway.lookup(&job_id).await.unwrap(), JobStatus::Pending);

        store.put_result(&job_id, "Inference Time: 1.0000s | Output Length: 5 chars").await.unwrap();

        for _ in 0..3 {
            assert_eq!(
                gateway.lookup(&job_id).await.unwrap(),
                JobStatus::Completed {
                    result: "Inference Time: 1.0000s | Output Length: 5 chars".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_id_reads_as_pending() {
        let store = Arc::new(InMemoryJobStore::new());
        let gateway = gateway(store, Arc::new(CannedText("")));
        assert_eq!(gateway.lookup("never-issued").await.unwrap(), JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_error_result_reads_as_completed() {
        let store = Arc::new(InMemoryJobStore::new());
        let gateway = gateway(store.clone(), Arc::new(CannedText("")));

        store.put_result("job", "Error: backend returned 500").await.unwrap();
        assert!(matches!(
            gateway.lookup("job").await.unwrap(),
            JobStatus::Completed { result } if result.starts_with("Error:")
        ));
    }

    #[tokio::test]
    async fn test_document_with_delimiter_keeps_id_boundary() {
        let store = Arc::new(InMemoryJobStore::new());
        let gateway = gateway(store.clone(), Arc::new(CannedText("Invoice | INV-42 | 2024-05-01")));

        let submitted = gateway.submit_document(&pdf_upload()).await.unwrap();

        let entries = store.pending_entries().await;
        let decoded = QueueEncoding::Legacy.decode(&entries[0]).unwrap();
        assert_eq!(decoded.id, submitted.job_id);
        assert!(!decoded.payload.contains('|'));
        assert!(decoded.payload.contains("INV-42"));
    }

    #[tokio::test]
    async fn test_failed_preprocessing_issues_no_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let gateway = gateway(store.clone(), Arc::new(Unreadable));

        let err = gateway.submit_document(&pdf_upload()).await.unwrap_err();
        assert!(matches!(err, AppError::Preprocessing(_)));
        assert!(store.pending_entries().await.is_empty());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(JobStatus::Pending).unwrap(),
            serde_json::json!({ "status": "pending" })
        );
        assert_eq!(
            serde_json::to_value(JobStatus::Completed { result: "done".into() }).unwrap(),
            serde_json::json!({ "status": "completed", "result": "done" })
        );
    }
}
