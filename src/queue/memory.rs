//! In-process job store.
//!
//! Backs the single-process `all` role and every test that needs a job store.
//! A store built with [`InMemoryJobStore::recording`] also keeps a log of
//! popped entries and of `put_result` calls so tests can check ordering and
//! the one-result-per-job guarantee. The logs grow with every job, so the
//! `all` role never turns them on.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;

use super::{effective_timeout, JobStore};
use crate::types::AppResult;

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    queue: Mutex<VecDeque<String>>,
    available: Notify,
    results: RwLock<HashMap<String, String>>,
    pop_log: Mutex<Vec<String>>,
    put_log: Mutex<Vec<String>>,
    dead_letters: Mutex<Vec<String>>,
    dead_letter_enabled: bool,
    record_history: bool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dead_letter(enabled: bool) -> Self {
        Self {
            dead_letter_enabled: enabled,
            ..Self::default()
        }
    }

    /// Keep pop and result-write history for inspection in tests
    pub fn recording() -> Self {
        Self {
            record_history: true,
            ..Self::default()
        }
    }

    /// Entries still waiting in the queue, head first
    pub async fn pending_entries(&self) -> Vec<String> {
        self.queue.lock().await.iter().cloned().collect()
    }

    /// Every entry handed out by `dequeue_blocking`, in pop order. Empty
    /// unless built with [`InMemoryJobStore::recording`].
    pub async fn popped_entries(&self) -> Vec<String> {
        self.pop_log.lock().await.clone()
    }

    /// Job ids in the order their results were written. Empty unless built
    /// with [`InMemoryJobStore::recording`].
    pub async fn result_writes(&self) -> Vec<String> {
        self.put_log.lock().await.clone()
    }

    pub async fn result_write_count(&self, job_id: &str) -> usize {
        self.put_log
            .lock()
            .await
            .iter()
            .filter(|id| id.as_str() == job_id)
            .count()
    }

    pub async fn dead_letters(&self) -> Vec<String> {
        self.dead_letters.lock().await.clone()
    }

    async fn try_pop(&self) -> Option<String> {
        let entry = self.queue.lock().await.pop_front()?;
        if self.record_history {
            self.pop_log.lock().await.push(entry.clone());
        }
        Some(entry)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, entry: &str) -> AppResult<()> {
        self.queue.lock().await.push_back(entry.to_string());
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue_blocking(&self, timeout: Option<Duration>) -> AppResult<Option<String>> {
        let deadline = effective_timeout(timeout).map(|t| Instant::now() + t);

        loop {
            // Register interest before checking so a push in between is not missed
            let notified = self.available.notified();
            if let Some(entry) = self.try_pop().await {
                return Ok(Some(entry));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(self.try_pop().await);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn put_result(&self, job_id: &str, value: &str) -> AppResult<()> {
        self.results
            .write()
            .await
            .insert(job_id.to_string(), value.to_string());
        if self.record_history {
            self.put_log.lock().await.push(job_id.to_string());
        }
        Ok(())
    }

    async fn get_result(&self, job_id: &str) -> AppResult<Option<String>> {
        Ok(self.results.read().await.get(job_id).cloned())
    }

    async fn dead_letter(&self, entry: &str) -> AppResult<bool> {
        if !self.dead_letter_enabled {
            return Ok(false);
        }
        self.dead_letters.lock().await.push(entry.to_string());
        Ok(true)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
