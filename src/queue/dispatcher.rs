//! Dispatcher
//!
//! The single consumer of the job queue. Each iteration blocks on the queue,
//! decodes one entry and forwards it to a worker, waiting for the worker to
//! finish before popping the next entry. At most one job is in flight, so jobs
//! complete in the order they were submitted.
//!
//! Two paths lose a job without ever recording a result:
//!
//! - the entry does not decode (`DispatchOutcome::Malformed`)
//! - the worker cannot be reached (`DispatchOutcome::TransportFailed`)
//!
//! Both are logged and counted in [`PipelineMetrics`]; the entry is parked in
//! the dead-letter queue when one is configured and discarded otherwise. A
//! client polling such a job sees `pending` indefinitely. Nothing is retried.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::forwarder::{HttpForwarder, JobForwarder};
use super::jobs::QueueEncoding;
use super::JobStore;
use crate::config::WorkerConfig;
use crate::metrics::PipelineMetrics;
use crate::types::AppResult;

/// Pause after the store itself fails before blocking on it again
const STORE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Forwarded { job_id: String, inference_time: f64 },
    Malformed { entry: String },
    TransportFailed { job_id: String },
    /// The dequeue timeout elapsed with nothing to do
    Idle,
}

pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    forwarder: Arc<dyn JobForwarder>,
    encoding: QueueEncoding,
    metrics: Arc<PipelineMetrics>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        forwarder: Arc<dyn JobForwarder>,
        encoding: QueueEncoding,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            forwarder,
            encoding,
            metrics,
        }
    }

    /// Dispatcher for the standalone `dispatch` role: forwards to
    /// `WORKER_URL` and needs nothing but the store.
    pub fn over_http(store: Arc<dyn JobStore>, worker: &WorkerConfig) -> Self {
        Self::new(
            store,
            Arc::new(HttpForwarder::new(worker.worker_url.clone())),
            worker.queue_encoding,
            Arc::new(PipelineMetrics::new()),
        )
    }

    /// Pop and handle a single entry. `timeout` of `None` blocks until an
    /// entry arrives. Errors only come from the store.
    pub async fn run_once(&self, timeout: Option<Duration>) -> AppResult<DispatchOutcome> {
        let Some(entry) = self.store.dequeue_blocking(timeout).await? else {
            return Ok(DispatchOutcome::Idle);
        };

        let job = match self.encoding.decode(&entry) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, entry_len = entry.len(), "Invalid job format received; dropping entry");
                self.metrics.record_dropped_malformed();
                self.park(&entry).await;
                return Ok(DispatchOutcome::Malformed { entry });
            }
        };

        info!(job_id = %job.id, prompt_len = job.payload.len(), "Processing job");
        self.metrics.record_dispatched();

        match self.forwarder.forward(&job).await {
            Ok(response) => {
                debug!(job_id = %job.id, inference_time = response.inference_time, "Worker finished job");
                Ok(DispatchOutcome::Forwarded {
                    job_id: job.id,
                    inference_time: response.inference_time,
                })
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Error calling worker; job dropped");
                self.metrics.record_dropped_transport();
                self.park(&entry).await;
                Ok(DispatchOutcome::TransportFailed { job_id: job.id })
            }
        }
    }

    /// Drain the queue forever. Store failures are logged and retried after a
    /// short pause; nothing about a single job stops the loop.
    pub async fn run(&self) {
        info!(encoding = %self.encoding, "Dispatcher started; waiting for jobs");
        loop {
            if let Err(e) = self.run_once(None).await {
                error!(error = %e, "Job store unavailable");
                tokio::time::sleep(STORE_ERROR_BACKOFF).await;
            }
        }
    }

    async fn park(&self, entry: &str) {
        match self.store.dead_letter(entry).await {
            Ok(true) => info!("Entry moved to dead-letter queue"),
            Ok(false) => {}
            Err(e) => error!(error = %e, "Failed to dead-letter entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvokeResponse;
    use crate::queue::{InMemoryJobStore, Job};
    use crate::types::AppError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Forwarder double that records jobs and can be told to fail.
    #[derive(Default)]
    struct RecordingForwarder {
        seen: Mutex<Vec<Job>>,
        fail: bool,
    }

    #[async_trait]
    impl JobForwarder for RecordingForwarder {
        async fn forward(&self, job: &Job) -> AppResult<InvokeResponse> {
            self.seen.lock().await.push(job.clone());
            if self.fail {
                return Err(AppError::Transport("connection refused".to_string()));
            }
            Ok(InvokeResponse::processed(Duration::from_millis(10)))
        }
    }

    fn dispatcher(
        store: Arc<InMemoryJobStore>,
        forwarder: Arc<RecordingForwarder>,
    ) -> (Dispatcher, Arc<PipelineMetrics>) {
        let metrics = Arc::new(PipelineMetrics::new());
        (
            Dispatcher::new(store, forwarder, QueueEncoding::Legacy, metrics.clone()),
            metrics,
        )
    }

    const SHORT: Option<Duration> = Some(Duration::from_millis(50));

    #[tokio::test]
    async fn test_jobs_are_forwarded_in_submission_order() {
        let store = Arc::new(InMemoryJobStore::new());
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, metrics) = dispatcher(store.clone(), forwarder.clone());

        let jobs: Vec<Job> = (0..10).map(|i| Job::new(format!("payload {i}"))).collect();
        for job in &jobs {
            store.enqueue(&QueueEncoding::Legacy.encode(job)).await.unwrap();
        }

        for job in &jobs {
            let outcome = dispatcher.run_once(SHORT).await.unwrap();
            assert!(matches!(outcome, DispatchOutcome::Forwarded { ref job_id, .. } if job_id == &job.id));
        }

        assert_eq!(*forwarder.seen.lock().await, jobs);
        assert_eq!(dispatcher.run_once(SHORT).await.unwrap(), DispatchOutcome::Idle);
        assert_eq!(metrics.snapshot().dispatched, 10);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_dropped_and_loop_continues() {
        let store = Arc::new(InMemoryJobStore::new());
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, metrics) = dispatcher(store.clone(), forwarder.clone());

        store.enqueue("no-delimiter-at-all").await.unwrap();
        let good = Job::new("next job");
        store.enqueue(&QueueEncoding::Legacy.encode(&good)).await.unwrap();

        assert_eq!(
            dispatcher.run_once(SHORT).await.unwrap(),
            DispatchOutcome::Malformed { entry: "no-delimiter-at-all".to_string() }
        );
        assert!(matches!(
            dispatcher.run_once(SHORT).await.unwrap(),
            DispatchOutcome::Forwarded { .. }
        ));

        assert_eq!(forwarder.seen.lock().await.len(), 1);
        assert_eq!(metrics.snapshot().dropped_malformed, 1);
        assert!(store.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_drops_job_without_result() {
        let store = Arc::new(InMemoryJobStore::new());
        let forwarder = Arc::new(RecordingForwarder { fail: true, ..Default::default() });
        let (dispatcher, metrics) = dispatcher(store.clone(), forwarder.clone());

        let job = Job::new("lost job");
        store.enqueue(&QueueEncoding::Legacy.encode(&job)).await.unwrap();

        assert_eq!(
            dispatcher.run_once(SHORT).await.unwrap(),
            DispatchOutcome::TransportFailed { job_id: job.id.clone() }
        );

        // Not requeued, no result: the job stays pending forever
        assert!(store.pending_entries().await.is_empty());
        assert_eq!(store.get_result(&job.id).await.unwrap(), None);
        assert_eq!(metrics.snapshot().dropped_transport, 1);
        assert_eq!(dispatcher.run_once(SHORT).await.unwrap(), DispatchOutcome::Idle);
    }

    #[tokio::test]
    async fn test_dead_letter_keeps_undeliverable_entries() {
        let store = Arc::new(InMemoryJobStore::with_dead_letter(true));
        let forwarder = Arc::new(RecordingForwarder { fail: true, ..Default::default() });
        let (dispatcher, _metrics) = dispatcher(store.clone(), forwarder);

        let job = Job::with_id("job-9", "payload");
        store.enqueue("garbage").await.unwrap();
        store.enqueue(&QueueEncoding::Legacy.encode(&job)).await.unwrap();

        dispatcher.run_once(SHORT).await.unwrap();
        dispatcher.run_once(SHORT).await.unwrap();

        assert_eq!(
            store.dead_letters().await,
            vec!["garbage".to_string(), "job-9|payload".to_string()]
        );
    }

    #[tokio::test]
    async fn test_over_http_posts_to_configured_worker() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/invoke")
            .match_body(mockito::Matcher::Json(serde_json::json!({ "job_id": "job-5", "prompt": "a | b" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"processed","inference_time":0.5}"#)
            .create_async()
            .await;

        let worker = WorkerConfig {
            output_tokens: 500,
            worker_url: format!("{}/invoke", server.url()),
            queue_encoding: QueueEncoding::Json,
        };
        let store = Arc::new(InMemoryJobStore::new());
        let dispatcher = Dispatcher::over_http(store.clone(), &worker);

        store
            .enqueue(&QueueEncoding::Json.encode(&Job::with_id("job-5", "a | b")))
            .await
            .unwrap();

        assert_eq!(
            dispatcher.run_once(SHORT).await.unwrap(),
            DispatchOutcome::Forwarded { job_id: "job-5".to_string(), inference_time: 0.5 }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_drains_queue_in_background() {
        let store = Arc::new(InMemoryJobStore::new());
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, _metrics) = dispatcher(store.clone(), forwarder.clone());

        let handle = tokio::spawn(async move { dispatcher.run().await });
        for i in 0..3 {
            store
                .enqueue(&QueueEncoding::Legacy.encode(&Job::with_id(format!("job-{i}"), "x")))
                .await
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while forwarder.seen.lock().await.len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("dispatcher should drain the queue");
        handle.abort();

        let ids: Vec<String> = forwarder.seen.lock().await.iter().map(|j| j.id.clone()).collect();
        assert_eq!(ids, vec!["job-0", "job-1", "job-2"]);
    }
}
