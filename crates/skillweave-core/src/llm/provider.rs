//! TextGenerator trait definition.
//!
//! The abstraction prompt-backed skills use to reach a generative text
//! service. Uses RPITIT for `generate`; implementations live in
//! skillweave-infra (e.g., `AnthropicClient`).

use std::sync::Arc;

use skillweave_types::llm::{GenerationRequest, GenerationResponse, LlmError};

/// A backend that turns a prompt into text.
pub trait TextGenerator: Send + Sync {
    /// Human-readable backend name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send one request and wait for the full response.
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl std::future::Future<Output = Result<GenerationResponse, LlmError>> + Send;
}

impl<T: TextGenerator> TextGenerator for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl std::future::Future<Output = Result<GenerationResponse, LlmError>> + Send {
        (**self).generate(request)
    }
}
