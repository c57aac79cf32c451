// Job records and the queue entry codec

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::AppError;

/// Separator between job id and payload in legacy queue entries
pub const ENTRY_DELIMITER: char = '|';
/// What a payload `|` is rewritten to before a legacy entry is written
pub const DELIMITER_SUBSTITUTE: &str = "\u{a6}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub payload: String,
}

impl Job {
    /// Create a job with a fresh v4 UUID
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload: payload.into(),
        }
    }

    pub fn with_id(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("entry has no '{}' delimiter", ENTRY_DELIMITER)]
    MissingDelimiter,

    #[error("entry has an empty job id")]
    EmptyId,

    #[error("entry is not a JSON job record: {0}")]
    InvalidJson(String),
}

/// Wire format of queue entries. Producers and the dispatcher must agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEncoding {
    /// `<id>|<payload>`, compatible with existing deployments
    #[default]
    Legacy,
    /// `{"id": ..., "payload": ...}`
    Json,
}

impl QueueEncoding {
    pub fn encode(&self, job: &Job) -> String {
        match self {
            QueueEncoding::Legacy => format!(
                "{}{}{}",
                job.id,
                ENTRY_DELIMITER,
                sanitize_payload(&job.payload)
            ),
            QueueEncoding::Json => {
                serde_json::json!({ "id": job.id, "payload": job.payload }).to_string()
            }
        }
    }

    pub fn decode(&self, entry: &str) -> Result<Job, DecodeError> {
        let job = match self {
            QueueEncoding::Legacy => {
                let (id, payload) = entry
                    .split_once(ENTRY_DELIMITER)
                    .ok_or(DecodeError::MissingDelimiter)?;
                Job::with_id(id, payload)
            }
            QueueEncoding::Json => serde_json::from_str::<Job>(entry)
                .map_err(|e| DecodeError::InvalidJson(e.to_string()))?,
        };

        if job.id.trim().is_empty() {
            return Err(DecodeError::EmptyId);
        }
        Ok(job)
    }
}

impl std::fmt::Display for QueueEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueEncoding::Legacy => write!(f, "legacy"),
            QueueEncoding::Json => write!(f, "json"),
        }
    }
}

impl FromStr for QueueEncoding {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "pipe" => Ok(QueueEncoding::Legacy),
            "json" => Ok(QueueEncoding::Json),
            other => Err(AppError::InvalidRequest(format!(
                "unknown queue encoding '{}', expected 'legacy' or 'json'",
                other
            ))),
        }
    }
}

pub fn sanitize_payload(payload: &str) -> String {
    payload.replace(ENTRY_DELIMITER, DELIMITER_SUBSTITUTE)
}
