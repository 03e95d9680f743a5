//! Anthropic Messages API Provider

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

const PROVIDER: &str = "anthropic";
const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: SecretString,
    api_base: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| {
                DocpilotError::Config(
                    "Anthropic API key not found. Set ANTHROPIC_API_KEY or llm.api_key"
                        .to_string(),
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

    fn build_request(&self, request: &CompletionRequest) -> MessagesRequest {
        MessagesRequest {
            model: request.model.clone(),
            max_tokens: self.max_tokens,
            temperature: request.temperature,
            system: (!request.context.is_empty()).then(|| request.context.clone()),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        }
    }
}

#[async_trait]
impl GenerationService for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        info!(
            "Generating with Anthropic (model: {}, temperature: {})",
            request.model, request.temperature
        );

        let start_time = Instant::now();
        let url = format!("{}/messages", self.api_base);
        debug!(chars = request.size(), "Sending request to Anthropic API");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&self.build_request(request))
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
                &format!("Anthropic API error ({}): {}", status, text),
                PROVIDER,
            );
            if let Some(wait) = retry_after {
                err = err.retry_after(wait);
            }
            return Err(err.into());
        }

        let body: MessagesResponse = response.json().await.map_err(|e| {
            ErrorClassifier::classify(
                &format!("Failed to parse Anthropic response: {}", e),
                PROVIDER,
            )
        })?;

        let joined: String = body
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let text = ensure_text(Some(joined), PROVIDER)?;

        Ok(Completion {
            text,
            usage: body
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
                .unwrap_or_default(),
            timing: ResponseTiming::from_duration(elapsed),
            model: body.model.unwrap_or_else(|| request.model.clone()),
        })
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_omitted_when_empty() {
        let config = LlmConfig {
            provider: "anthropic".into(),
            api_key: Some("test-key".into()),
            ..LlmConfig::default()
        };
        let provider = AnthropicProvider::new(&config).unwrap();
        let request = CompletionRequest {
            prompt: "Describe".into(),
            context: String::new(),
            model: "claude-3-haiku".into(),
            temperature: 0.0,
        };
        let json = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_response_text_blocks() {
        let json = r##"{"content":[{"type":"text","text":"# A"},{"type":"tool_use"},{"type":"text","text":"\nB"}],"usage":{"input_tokens":5,"output_tokens":2}}"##;
        let parsed: MessagesResponse = serde_json::from_str(json).unwrap();
        let texts: Vec<_> = parsed
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        assert_eq!(texts.concat(), "# A\nB");
    }
}
