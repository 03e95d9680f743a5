//! Ollama Local LLM Provider
//!
//! Generation adapter for locally-running Ollama models.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    Completion, CompletionRequest, ErrorCategory, ErrorClassifier, GenerationService,
    ResponseTiming, ServiceError, TokenUsage, ensure_text,
};
use crate::config::LlmConfig;
use crate::types::{DocpilotError, Result};

const PROVIDER: &str = "ollama";
const DEFAULT_API_BASE: &str = "http://localhost:11434";

pub struct OllamaProvider {
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let api_base = Self::validate_endpoint(&api_base)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocpilotError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base,
            model: config.model.clone(),
            client,
        })
    }

    /// Only http/https are accepted; non-local hosts get a warning.
    fn validate_endpoint(endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint).map_err(|e| {
            DocpilotError::Config(format!("Invalid Ollama endpoint URL '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(DocpilotError::Config(format!(
                "Ollama endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        if let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
        {
            warn!(
                "Ollama endpoint is not localhost: {}. Ensure this is intentional.",
                host
            );
        }

        let mut result = url.to_string();
        if result.ends_with('/') {
            result.pop();
        }
        Ok(result)
    }

    fn build_request(&self, request: &CompletionRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: (!request.context.is_empty()).then(|| request.context.clone()),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
            },
        }
    }
}

#[async_trait]
impl GenerationService for OllamaProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        info!(
            "Generating with Ollama (model: {}, temperature: {})",
            request.model, request.temperature
        );

        let start_time = Instant::now();
        let url = format!("{}/api/generate", self.api_base);

        debug!(chars = request.size(), "Sending request to Ollama API");

        let response = self
            .client
            .post(&url)
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ServiceError::with_provider(
                        ErrorCategory::Network,
                        format!(
                            "Failed to connect to Ollama at {}. Is Ollama running? Start with: ollama serve",
                            self.api_base
                        ),
                        PROVIDER,
                    )
                } else {
                    ErrorClassifier::classify(&format!("Ollama request failed: {}", e), PROVIDER)
                }
            })?;

        let elapsed = start_time.elapsed();

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(
                status,
                &format!("Ollama API error ({}): {}", status, body),
                PROVIDER,
            )
            .into());
        }

        let body: OllamaResponse = response.json().await.map_err(|e| {
            ErrorClassifier::classify(&format!("Failed to parse Ollama response: {}", e), PROVIDER)
        })?;

        let usage = TokenUsage::new(
            body.prompt_eval_count.unwrap_or(0),
            body.eval_count.unwrap_or(0),
        );

        Ok(Completion {
            text: ensure_text(Some(body.response), PROVIDER)?,
            usage,
            timing: ResponseTiming::from_duration(elapsed),
            model: request.model.clone(),
        })
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_endpoint_strips_slash() {
        let url = OllamaProvider::validate_endpoint("http://localhost:11434/").unwrap();
        assert_eq!(url, "http://localhost:11434");
    }

    #[test]
    fn test_validate_endpoint_rejects_scheme() {
        assert!(OllamaProvider::validate_endpoint("file:///etc/passwd").is_err());
        assert!(OllamaProvider::validate_endpoint("not a url").is_err());
    }

    #[test]
    fn test_response_usage_optional() {
        let parsed: OllamaResponse = serde_json::from_str(r#"{"response":"hi"}"#).unwrap();
        assert_eq!(parsed.eval_count, None);
        assert_eq!(parsed.response, "hi");
    }
}
