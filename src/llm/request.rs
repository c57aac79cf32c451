// Request construction for document extraction prompts

use crate::config::{Config, InferenceConfig};
use crate::types::{InferenceMode, LLMMessage, LLMRequest, PromptInput};

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant designed to extract structured data from documents.";

const EXTRACTION_INSTRUCTION: &str =
    "Please extract the invoice number and invoice date from the following document text: ";

/// Fixed request parameters, read once from configuration at startup.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub model: String,
    pub mode: InferenceMode,
    pub output_tokens: u32,
    pub temperature: f32,
    pub send_min_tokens: bool,
}

impl RequestTemplate {
    pub fn new(inference: &InferenceConfig, output_tokens: u32) -> Self {
        Self {
            model: inference.model.clone(),
            mode: inference.mode,
            output_tokens,
            temperature: inference.temperature,
            send_min_tokens: inference.send_min_tokens,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.inference, config.worker.output_tokens)
    }

    pub fn build(&self, prompt: &str) -> LLMRequest {
        let input = match self.mode {
            InferenceMode::Chat => PromptInput::Chat(vec![
                LLMMessage::system(SYSTEM_PROMPT),
                LLMMessage::user(format!("{}{}", EXTRACTION_INSTRUCTION, prompt)),
            ]),
            InferenceMode::Completion => PromptInput::Text(prompt.to_string()),
        };

        LLMRequest {
            model: self.model.clone(),
            input,
            max_tokens: Some(self.output_tokens),
            min_tokens: self.send_min_tokens.then_some(self.output_tokens),
            temperature: Some(self.temperature),
            ignore_eos: true,
        }
    }
}
