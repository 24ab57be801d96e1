//! Anthropic Messages API oracle
//!
//! Each call is stateless: the prompt carries the whole history the model
//! needs, so no conversation is kept between steps.

use crate::auth;
use crate::circuit_breaker::CircuitBreaker;
use crate::oracle::{Oracle, Prompt};
use crate::types::{
    AnthropicMessage, AnthropicRequest, AnthropicResponse, ContentBlock, ImageSource, Model,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pilot_core::config::ModelConfig;
use pilot_core::{PilotError, Result};
use std::sync::Arc;
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 1024;

// Transport retry configuration
const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_SECS: u64 = 5;
const MAX_BACKOFF_SECS: u64 = 120;

const SYSTEM_PROMPT: &str = "You operate a computer one action at a time. \
Look at the screenshot and the history, then choose the single next action.";

const JSON_MODE_INSTRUCTION: &str = "Respond with exactly one JSON object and nothing else. \
No prose, no Markdown code fences.";

/// Oracle backed by the Anthropic Messages API
#[derive(Clone)]
pub struct AnthropicOracle {
    model: Model,
    max_tokens: usize,
    api_key_env: String,
    http: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl AnthropicOracle {
    /// Create a new oracle client
    pub fn new(model: Model) -> Self {
        Self {
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            http: reqwest::Client::new(),
            circuit_breaker: Arc::new(CircuitBreaker::default()),
        }
    }

    /// Build a client from the `[models]` section of the project config
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let model: Model = config.default.parse().map_err(PilotError::Config)?;
        Ok(Self::new(model)
            .with_max_tokens(config.max_tokens)
            .with_api_key_env(&config.api_key_env))
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Read the API key from a different environment variable
    pub fn with_api_key_env(mut self, name: &str) -> Self {
        self.api_key_env = name.to_string();
        self
    }

    pub fn model(&self) -> Model {
        self.model
    }

    fn build_request(&self, prompt: &Prompt, json_mode: bool) -> AnthropicRequest {
        let mut content = Vec::new();

        if let Some(png) = &prompt.screenshot {
            content.push(ContentBlock::Image {
                source: ImageSource {
                    source_type: "base64".to_string(),
                    media_type: "image/png".to_string(),
                    data: STANDARD.encode(png),
                },
            });
        }

        let mut text = prompt.text.clone();
        if json_mode {
            text.push_str("\n\n");
            text.push_str(JSON_MODE_INSTRUCTION);
        }
        content.push(ContentBlock::Text { text });

        AnthropicRequest {
            model: self.model.api_name().to_string(),
            max_tokens: self.max_tokens,
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content,
            }],
        }
    }
}

impl Default for AnthropicOracle {
    fn default() -> Self {
        Self::new(Model::default())
    }
}

#[async_trait]
impl Oracle for AnthropicOracle {
    async fn chat(&self, prompt: &Prompt, json_mode: bool) -> Result<String> {
        tracing::debug!(
            "Calling oracle {} (json_mode: {}, screenshot: {})",
            self.model,
            json_mode,
            prompt.screenshot.is_some()
        );

        if !self.circuit_breaker.can_execute() {
            return Err(PilotError::ApiLimit(format!(
                "Circuit breaker is OPEN - too many API failures. Wait {} seconds before retry.",
                self.circuit_breaker.time_until_retry().as_secs()
            )));
        }

        let auth_token = auth::get_auth_token(&self.api_key_env)?;
        let request = self.build_request(prompt, json_mode);

        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            let response = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &auth_token)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    self.circuit_breaker.record_failure();
                    PilotError::Api(format!("Failed to send request: {}", e))
                })?;

            let status = response.status();

            // Handle rate limit (429) with retry
            if status.as_u16() == 429 {
                retries += 1;

                if retries > MAX_RETRIES {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown".to_string());
                    return Err(PilotError::ApiLimit(format!(
                        "Rate limit exceeded after {} retries. Last error: {}",
                        MAX_RETRIES, error_text
                    )));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                tracing::warn!(
                    "Rate limited (429). Waiting {} seconds before retry {}/{}",
                    wait_secs,
                    retries,
                    MAX_RETRIES
                );

                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown".to_string());

                if status.is_server_error() && retries < MAX_RETRIES {
                    retries += 1;
                    tracing::warn!(
                        "Server error ({}). Waiting {} seconds before retry {}/{}",
                        status,
                        backoff_secs,
                        retries,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                self.circuit_breaker.record_failure();
                tracing::error!(
                    "Circuit breaker: recorded failure (count: {})",
                    self.circuit_breaker.failure_count()
                );

                return Err(PilotError::Api(format!(
                    "Anthropic API error {}: {}",
                    status, error_text
                )));
            }

            let parsed: AnthropicResponse = response
                .json()
                .await
                .map_err(|e| PilotError::Api(format!("Failed to parse response: {}", e)))?;

            self.circuit_breaker.record_success();

            // Text blocks only; an empty reply is left for the validators to reject
            let output: String = parsed
                .content
                .iter()
                .filter(|block| block.content_type == "text")
                .map(|block| block.text.as_str())
                .collect::<Vec<_>>()
                .join("");

            if let Some(usage) = &parsed.usage {
                tracing::debug!(
                    "Oracle reply: {} chars, {} input tokens, {} output tokens",
                    output.len(),
                    usage.input_tokens,
                    usage.output_tokens
                );
            }

            return Ok(output);
        }
    }
}
