/// LLM Client: the single point of entry for all model calls.
///
/// No other module talks to a chat-completion API directly. Every call goes
/// through [`LlmClient::invoke`], which applies the model settings, bounds
/// each attempt with a timeout, retries transient failures with exponential
/// backoff, and reports token usage and latency.
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::LlmConfig;

pub mod prompts;
pub mod transport;

pub use transport::{
    ChatCompletion, ChatMessage, ChatRequest, ChatTransport, HttpChatTransport, ResponseFormat,
};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// Rate limits, server errors, timeouts and connection failures are worth
    /// another attempt. Bad requests, auth failures and malformed bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Timeout(_) => true,
            LlmError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LlmError::Parse(_) | LlmError::EmptyContent => false,
        }
    }
}

/// A model call that failed for good, either on a non-transient error or
/// after the retry budget ran out. Carries the last underlying error.
#[derive(Debug, Error)]
#[error("Model call '{step}' to {model} failed after {attempts} attempt(s): {source}")]
pub struct ModelInvocationError {
    pub step: String,
    pub model: String,
    pub attempts: u32,
    #[source]
    pub source: LlmError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub latency_ms: u64,
    pub model: String,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `min × 2^(retry-1)`,
    /// clamped to `[min_delay, max_delay]`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.min_delay
            .saturating_mul(factor)
            .clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }
}

impl From<&LlmConfig> for RetryPolicy {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_delay: config.retry_min,
            max_delay: config.retry_max,
        }
    }
}

/// The single LLM client used by all pipeline stages.
#[derive(Clone)]
pub struct LlmClient {
    transport: Arc<dyn ChatTransport>,
    provider: String,
    model: String,
    default_temperature: f32,
    max_tokens: u32,
    attempt_timeout: Duration,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(transport: Arc<dyn ChatTransport>, config: &LlmConfig) -> Self {
        Self {
            transport,
            provider: config.provider.clone(),
            model: config.model.clone(),
            default_temperature: config.temperature,
            max_tokens: config.max_tokens,
            attempt_timeout: config.timeout,
            retry: RetryPolicy::from(config),
        }
    }

    /// Client backed by an OpenAI-compatible HTTP endpoint.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let transport = HttpChatTransport::new(&config.api_base, &config.api_key, config.timeout)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one system + user prompt pair. `step` labels logs and errors.
    pub async fn invoke(
        &self,
        step: &str,
        system: &str,
        user: &str,
        temperature: Option<f32>,
        response_format: Option<ResponseFormat>,
    ) -> Result<ModelResponse, ModelInvocationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: temperature.unwrap_or(self.default_temperature),
            max_tokens: self.max_tokens,
            response_format,
        };

        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result =
                match tokio::time::timeout(self.attempt_timeout, self.transport.complete(&request))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout(self.attempt_timeout)),
                };

            let error = match result {
                Ok(completion) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        "LLM call '{step}' succeeded: prompt_tokens={}, completion_tokens={}, {latency_ms}ms",
                        completion.prompt_tokens, completion.completion_tokens
                    );
                    return Ok(ModelResponse {
                        content: completion.content,
                        prompt_tokens: completion.prompt_tokens,
                        completion_tokens: completion.completion_tokens,
                        total_tokens: completion.total_tokens,
                        latency_ms,
                        model: completion.model,
                    });
                }
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= self.retry.max_attempts {
                return Err(ModelInvocationError {
                    step: step.to_string(),
                    model: self.model.clone(),
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                "LLM call '{step}' attempt {attempt} failed ({error}), retrying after {}ms...",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Parses a model reply as JSON, tolerating markdown code fences.
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    serde_json::from_str(strip_json_fences(content)).map_err(LlmError::Parse)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
