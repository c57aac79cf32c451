// vLLM adapter (OpenAI-compatible HTTP API)
// Chat mode:       POST {base}/v1/chat/completions
// Completion mode: POST {base}/v1/completions
//
// vLLM accepts two sampling extensions on top of the OpenAI schema that the
// benchmark relies on: `min_tokens` and `ignore_eos`. Some vLLM versions reject
// `min_tokens` on the chat route, hence `RequestTemplate::send_min_tokens`.

use crate::llm::provider::InferenceBackend;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse, PromptInput, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const COMPLETIONS_PATH: &str = "/v1/completions";

pub struct VllmAdapter {
    client: Client,
    base_url: String,
}

// Request types for the vLLM API
#[derive(Serialize)]
struct VllmRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<&'a [LLMMessage]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    ignore_eos: bool,
}

// Response types for the vLLM API
#[derive(Deserialize)]
struct VllmResponse {
    #[serde(default)]
    choices: Vec<VllmChoice>,
    #[serde(default)]
    usage: Option<VllmUsage>,
}

#[derive(Deserialize)]
struct VllmChoice {
    // chat route
    #[serde(default)]
    message: Option<VllmMessage>,
    // completion route
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct VllmMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct VllmUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct VllmErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<VllmError>,
}

#[derive(Deserialize)]
struct VllmError {
    message: String,
}

impl VllmAdapter {
    /// `timeout` of `None` lets a request run as long as the backend takes.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> AppResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, input: &PromptInput) -> String {
        let path = match input {
            PromptInput::Chat(_) => CHAT_COMPLETIONS_PATH,
            PromptInput::Text(_) => COMPLETIONS_PATH,
        };
        format!("{}{}", self.base_url, path)
    }

    fn error_message(body: &str) -> String {
        match serde_json::from_str::<VllmErrorResponse>(body) {
            Ok(VllmErrorResponse { error: Some(error), .. }) => error.message,
            Ok(VllmErrorResponse { message: Some(message), .. }) => message,
            _ => body.to_string(),
        }
    }
}

#[async_trait]
impl InferenceBackend for VllmAdapter {
    async fn create_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = self.endpoint(&request.input);

        let (messages, prompt) = match &request.input {
            PromptInput::Chat(messages) => (Some(messages.as_slice()), None),
            PromptInput::Text(prompt) => (None, Some(prompt.as_str())),
        };
        let body = VllmRequest {
            model: &request.model,
            messages,
            prompt,
            max_tokens: request.max_tokens,
            min_tokens: request.min_tokens,
            temperature: request.temperature,
            ignore_eos: request.ignore_eos,
        };

        debug!(url = %url, model = %request.model, "Sending inference request");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Inference(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Inference(format!(
                "backend returned {}: {}",
                status,
                Self::error_message(&error_text)
            )));
        }

        let vllm_response: VllmResponse = response
            .json()
            .await
            .map_err(|e| AppError::Inference(format!("failed to parse backend response: {}", e)))?;

        if let Some(usage) = &vllm_response.usage {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Token usage"
            );
        }

        let choice = vllm_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Inference("backend returned no choices".to_string()))?;

        let content = match &request.input {
            PromptInput::Chat(_) => choice.message.and_then(|m| m.content),
            PromptInput::Text(_) => choice.text,
        }
        .ok_or_else(|| AppError::Inference("backend response has no generated text".to_string()))?;

        Ok(LLMResponse {
            content,
            finish_reason: choice.finish_reason,
            usage: vllm_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}
