use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::queue::jobs::QueueEncoding;
use crate::types::{InferenceMode, StoreBackend};

pub const DEFAULT_OUTPUT_TOKENS: u32 = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub worker: WorkerConfig,
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub worker_port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub backend: StoreBackend,
    pub queue_key: String,
    /// Results are stored under `<prefix><job_id>`; empty keeps bare job ids
    pub result_key_prefix: String,
    pub result_ttl_secs: Option<u64>,
    pub dead_letter_queue: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub output_tokens: u32,
    pub worker_url: String,
    pub queue_encoding: QueueEncoding,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub mode: InferenceMode,
    pub temperature: f32,
    pub send_min_tokens: bool,
    pub timeout_secs: Option<u64>,
}

impl InferenceConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup; `from_env` passes
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            server: ServerConfig {
                port: var("PORT", "3000")
                    .parse()
                    .context("PORT must be a valid port number")?,
                worker_port: var("WORKER_PORT", "8001")
                    .parse()
                    .context("WORKER_PORT must be a valid port number")?,
                host: var("HOST", "0.0.0.0"),
                cors_allowed_origins: var("ALLOWED_ORIGINS", "*")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            redis: RedisConfig {
                url: var("REDIS_URL", "redis://localhost:6379"),
                backend: var("STORE_BACKEND", "redis").parse()?,
                queue_key: var("JOB_QUEUE_KEY", "job_queue"),
                result_key_prefix: var("RESULT_KEY_PREFIX", ""),
                result_ttl_secs: optional("RESULT_TTL_SECS")
                    .map(|v| v.parse())
                    .transpose()
                    .context("RESULT_TTL_SECS must be a whole number of seconds")?,
                dead_letter_queue: optional("DEAD_LETTER_QUEUE"),
            },
            worker: WorkerConfig {
                output_tokens: var("OUTPUT_TOKENS", &DEFAULT_OUTPUT_TOKENS.to_string())
                    .parse()
                    .context("OUTPUT_TOKENS must be a positive integer")?,
                worker_url: var("WORKER_URL", "http://localhost:8001/invoke"),
                queue_encoding: var("QUEUE_ENCODING", "legacy").parse()?,
            },
            inference: InferenceConfig {
                base_url: var("VLLM_URL", "http://localhost:8000"),
                model: var("VLLM_MODEL", "deepseek-ai/DeepSeek-R1-Distill-Qwen-32B"),
                mode: var("INFERENCE_MODE", "chat").parse()?,
                temperature: var("INFERENCE_TEMPERATURE", "0.7")
                    .parse()
                    .context("INFERENCE_TEMPERATURE must be a number")?,
                send_min_tokens: var("INFERENCE_SEND_MIN_TOKENS", "true")
                    .parse()
                    .context("INFERENCE_SEND_MIN_TOKENS must be true or false")?,
                timeout_secs: optional("INFERENCE_TIMEOUT_SECS")
                    .map(|v| v.parse())
                    .transpose()
                    .context("INFERENCE_TIMEOUT_SECS must be a whole number of seconds")?,
            },
        })
    }
}
