//! Job queue
//!
//! The job store is the only state shared between the gateway, the dispatcher
//! and the worker. It holds two things:
//!
//! - a FIFO list of encoded job entries (see [`jobs::QueueEncoding`])
//! - a key/value map from job id to result string
//!
//! ```text
//!  Gateway ──enqueue──▶ [ queue ] ──dequeue_blocking──▶ Dispatcher ──forward──▶ Worker
//!     ▲                                                                          │
//!     └──────────────get_result────── [ results ] ◀──────────put_result──────────┘
//! ```
//!
//! Components receive the store as `Arc<dyn JobStore>` so tests can swap in
//! [`memory::InMemoryJobStore`].

pub mod dispatcher;
pub mod forwarder;
pub mod jobs;
pub mod memory;
pub mod redis_store;
pub mod workers;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use forwarder::{HttpForwarder, JobForwarder, LocalForwarder};
pub use jobs::{DecodeError, Job, QueueEncoding};
pub use memory::InMemoryJobStore;
pub use redis_store::RedisJobStore;
pub use workers::WorkerInvoker;

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::RedisConfig;
use crate::types::{AppResult, StoreBackend};
use crate::utils::with_retry;

const CONNECT_ATTEMPTS: u32 = 5;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Append an encoded entry to the tail of the queue.
    async fn enqueue(&self, entry: &str) -> AppResult<()>;

    /// Pop the head entry, waiting until one is available. `None` or a zero
    /// timeout waits indefinitely; otherwise `Ok(None)` means the timeout
    /// elapsed with the queue still empty. Each entry is handed to exactly one
    /// caller.
    async fn dequeue_blocking(&self, timeout: Option<Duration>) -> AppResult<Option<String>>;

    /// Upsert the result for a job. Last write wins.
    async fn put_result(&self, job_id: &str, value: &str) -> AppResult<()>;

    /// `None` for both unknown and still-running jobs.
    async fn get_result(&self, job_id: &str) -> AppResult<Option<String>>;

    /// Park an entry the dispatcher could not deliver. Returns `false` when no
    /// dead-letter queue is configured and the entry was discarded.
    async fn dead_letter(&self, entry: &str) -> AppResult<bool>;

    async fn ping(&self) -> AppResult<()>;
}

/// Treat a zero timeout the same as no timeout.
pub(crate) fn effective_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

/// Open the configured store, retrying the Redis connection with backoff.
pub async fn connect_store(config: &RedisConfig) -> AppResult<Arc<dyn JobStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-process job store");
            Ok(Arc::new(InMemoryJobStore::with_dead_letter(
                config.dead_letter_queue.is_some(),
            )))
        }
        StoreBackend::Redis => {
            info!(url = %config.url, queue = %config.queue_key, "Connecting to Redis job store");
            let store = with_retry(
                || {
                    let config = config.clone();
                    async move { RedisJobStore::connect(&config).await }.boxed()
                },
                CONNECT_ATTEMPTS,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}
