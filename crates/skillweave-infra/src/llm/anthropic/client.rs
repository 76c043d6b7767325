//! AnthropicClient -- concrete [`TextGenerator`] for the Anthropic Messages API.
//!
//! Sends non-streaming requests to `/v1/messages` with the authentication
//! and version headers. The API key is wrapped in [`secrecy::SecretString`]
//! and is never logged or included in `Debug` output.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use skillweave_core::llm::provider::TextGenerator;
use skillweave_types::config::LlmConfig;
use skillweave_types::llm::{GenerationRequest, GenerationResponse, LlmError};

use super::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse};

/// Anthropic Claude text generator.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    /// Per-request HTTP timeout; long generations can take minutes.
    const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(api_key: SecretString, model: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Self::HTTP_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            model: model.into(),
        })
    }

    /// Build a client from configuration, reading the key from the
    /// environment variable named by `config.api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;

        Ok(Self::new(SecretString::from(key), config.model.clone())?
            .with_base_url(config.base_url.clone()))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Override the base URL (proxies, local gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn to_anthropic_request(&self, request: &GenerationRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            system: request.system.clone(),
            temperature: request.temperature,
        }
    }
}

/// Map a non-success HTTP status to an [`LlmError`].
fn error_for_status(status: u16, body: String) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited,
        529 => LlmError::Overloaded(body),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

impl TextGenerator for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let body = self.to_anthropic_request(request);

        let response = self
            .client
            .post(self.url("/v1/messages"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), model = %self.model, "generation request rejected");
            return Err(error_for_status(status.as_u16(), error_body));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        tracing::debug!(
            model = %parsed.model,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            stop_reason = parsed.stop_reason.as_deref().unwrap_or("-"),
            "generation completed"
        );

        Ok(GenerationResponse {
            content: parsed.text(),
            model: parsed.model,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_client() -> AnthropicClient {
        AnthropicClient::new(SecretString::from("test-key-not-real"), "claude-sonnet-4-20250514").unwrap()
    }

    #[test]
    fn test_client_name_and_model() {
        let client = make_client();
        assert_eq!(client.name(), "anthropic");
        assert_eq!(client.model(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_to_anthropic_request() {
        let client = make_client();
        let request = GenerationRequest::new("Design a quiz", 1024).with_system("Be concise");

        let body = client.to_anthropic_request(&request);
        assert_eq!(body.model, "claude-sonnet-4-20250514");
        assert_eq!(body.max_tokens, 1024);
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.messages[0].content, "Design a quiz");
        assert_eq!(body.system.as_deref(), Some("Be concise"));
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let client = make_client().with_base_url("http://localhost:8080/");
        assert_eq!(client.url("/v1/messages"), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn test_error_for_status() {
        assert!(matches!(error_for_status(401, String::new()), LlmError::AuthenticationFailed));
        assert!(matches!(error_for_status(429, String::new()), LlmError::RateLimited));
        assert!(matches!(error_for_status(529, "busy".into()), LlmError::Overloaded(b) if b == "busy"));
        let other = error_for_status(500, "oops".into());
        assert!(other.to_string().contains("HTTP 500: oops"));
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = LlmConfig {
            api_key_env: "SKILLWEAVE_TEST_MISSING_KEY".to_string(),
            ..LlmConfig::default()
        };
        let err = AnthropicClient::from_config(&config).err().unwrap();
        assert!(matches!(err, LlmError::MissingApiKey(name) if name == "SKILLWEAVE_TEST_MISSING_KEY"));
    }

    #[test]
    fn test_from_config_reads_key_and_base_url() {
        // SAFETY: no other test reads or writes this variable.
        unsafe {
            std::env::set_var("SKILLWEAVE_TEST_PRESENT_KEY", "sk-test");
        }
        let config = LlmConfig {
            api_key_env: "SKILLWEAVE_TEST_PRESENT_KEY".to_string(),
            base_url: "http://proxy.local".to_string(),
            model: "claude-haiku".to_string(),
            ..LlmConfig::default()
        };
        let client = AnthropicClient::from_config(&config).unwrap();
        unsafe {
            std::env::remove_var("SKILLWEAVE_TEST_PRESENT_KEY");
        }

        assert_eq!(client.model(), "claude-haiku");
        assert_eq!(client.url("/v1/messages"), "http://proxy.local/v1/messages");
        assert_eq!(client.api_key.expose_secret(), "sk-test");
    }
}
