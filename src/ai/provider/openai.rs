//! OpenAI API Provider
//!
//! Generation adapter for OpenAI's Chat Completions API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{
    Completion, CompletionRequest, ErrorClassifier, GenerationService, ResponseTiming,
    TokenUsage, ensure_text,
};
use crate::config::LlmConfig;
use crate::constants::network;
use crate::types::{DocpilotError, Result};

const PROVIDER: &str = "openai";
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// Never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                DocpilotError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY or llm.api_key".to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS))
            .build()
            .map_err(|e| DocpilotError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if !request.context.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: request.context.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        ChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: Some(self.max_tokens),
        }
    }
}

#[async_trait]
impl GenerationService for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        info!(
            "Generating with OpenAI (model: {}, temperature: {})",
            request.model, request.temperature
        );

        let start_time = Instant::now();
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(chars = request.size(), "Sending request to OpenAI API");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify(&format!("request failed: {}", e), PROVIDER))?;

        let elapsed = start_time.elapsed();

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = ErrorClassifier::parse_retry_after(
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok()),
            );
            let text = response.text().await.unwrap_or_default();
            let mut err = ErrorClassifier::classify_http_status(
                status,
                &format!("OpenAI API error ({}): {}", status, text),
                PROVIDER,
            );
            if let Some(wait) = retry_after {
                err = err.retry_after(wait);
            }
            return Err(err.into());
        }

        let response_body: ChatCompletionResponse = response.json().await.map_err(|e| {
            ErrorClassifier::classify(&format!("Failed to parse OpenAI response: {}", e), PROVIDER)
        })?;

        let usage = response_body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let text = ensure_text(
            response_body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content),
            PROVIDER,
        )?;

        Ok(Completion {
            text,
            usage,
            timing: ResponseTiming::from_duration(elapsed),
            model: response_body.model.unwrap_or_else(|| request.model.clone()),
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
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            api_base: Some("http://localhost:9/v1/".to_string()),
            ..LlmConfig::default()
        };
        OpenAiProvider::new(&config).unwrap()
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", provider());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-test"));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(provider().api_base, "http://localhost:9/v1");
    }

    #[test]
    fn test_context_becomes_system_message() {
        let p = provider();
        let request = CompletionRequest {
            prompt: "Write a README".into(),
            context: "Languages: python".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.2,
        };
        let body = p.build_request(&request);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].content, "Write a README");

        let bare = CompletionRequest {
            context: String::new(),
            ..request
        };
        assert_eq!(p.build_request(&bare).messages.len(), 1);
    }

    #[test]
    fn test_response_parsing() {
        let json = r##"{"model":"gpt-4o-mini","choices":[{"message":{"content":"# Title"}}],"usage":{"prompt_tokens":12,"completion_tokens":3}}"##;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 12);
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("# Title")
        );
    }
}
