use async_trait::async_trait;
use crate::types::{AppResult, LLMRequest, LLMResponse};

/// A text-generation backend. Latency is unbounded from the caller's side.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn create_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}
