// Inference backend abstraction layer

pub mod provider;
pub mod request;
pub mod vllm;

pub use provider::*;
pub use request::RequestTemplate;
pub use vllm::VllmAdapter;
