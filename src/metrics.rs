//! Pipeline counters.
//!
//! Lock-free counters shared by the gateway, dispatcher and worker. The two
//! `dropped_*` counters are the only trace left by jobs that are lost between
//! the queue and the worker: a client polling such a job sees `pending`
//! forever, so these are what an operator alerts on.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_transport: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`], served at `/api/metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub dispatched: u64,
    pub dropped_malformed: u64,
    pub dropped_transport: u64,
    pub completed: u64,
    pub failed: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A job id was issued and its entry enqueued
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A well-formed entry was popped and handed to the forwarder
    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_malformed(&self) {
        self.dropped_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_transport(&self) {
        self.dropped_transport.fetch_add(1, Ordering::Relaxed);
    }

    /// Inference succeeded and a summary result was written
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Inference failed and an `Error:` result was written
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_transport: self.dropped_transport.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
