//! Redis job store.
//!
//! Queue entries live in a Redis list pushed with `RPUSH` and drained with
//! `BLPOP`, which gives FIFO order and hands each entry to exactly one
//! consumer. Results are plain string keys (`SET`, optionally `SETEX`).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use super::{effective_timeout, JobStore};
use crate::config::RedisConfig;
use crate::types::AppResult;

#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    // BLPOP parks the whole connection, so the dispatcher gets its own
    blocking_conn: ConnectionManager,
    queue_key: String,
    result_key_prefix: String,
    result_ttl_secs: Option<u64>,
    dead_letter_key: Option<String>,
}

impl RedisJobStore {
    pub async fn connect(config: &RedisConfig) -> AppResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let blocking_conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            blocking_conn,
            queue_key: config.queue_key.clone(),
            result_key_prefix: config.result_key_prefix.clone(),
            result_ttl_secs: config.result_ttl_secs,
            dead_letter_key: config.dead_letter_queue.clone(),
        })
    }

    fn result_key(&self, job_id: &str) -> String {
        result_key(&self.result_key_prefix, job_id)
    }
}

fn result_key(prefix: &str, job_id: &str) -> String {
    format!("{}{}", prefix, job_id)
}

/// `BLPOP` timeout argument; 0 blocks forever.
fn blpop_timeout_secs(timeout: Option<Duration>) -> f64 {
    effective_timeout(timeout)
        .map(|t| t.as_secs_f64())
        .unwrap_or(0.0)
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn enqueue(&self, entry: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let length: i64 = conn.rpush(&self.queue_key, entry).await?;
        debug!(queue = %self.queue_key, length, "Entry enqueued");
        Ok(())
    }

    async fn dequeue_blocking(&self, timeout: Option<Duration>) -> AppResult<Option<String>> {
        let mut conn = self.blocking_conn.clone();
        let popped: Option<(String, String)> = conn
            .blpop(&self.queue_key, blpop_timeout_secs(timeout))
            .await?;
        Ok(popped.map(|(_key, entry)| entry))
    }

    async fn put_result(&self, job_id: &str, value: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = self.result_key(job_id);
        match self.result_ttl_secs {
            Some(ttl) => {
                let _: () = conn.set_ex(&key, value, ttl).await?;
            }
            None => {
                let _: () = conn.set(&key, value).await?;
            }
        }
        Ok(())
    }

    async fn get_result(&self, job_id: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.result_key(job_id)).await?;
        Ok(value)
    }

    async fn dead_letter(&self, entry: &str) -> AppResult<bool> {
        let Some(key) = &self.dead_letter_key else {
            return Ok(false);
        };
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(key, entry).await?;
        Ok(true)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
