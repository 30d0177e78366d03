//! OpenAI-compatible chat-completion client with retry for transient errors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::error::{LlmError, LlmErrorKind, RetryConfig, classify_http_status};
use super::{ChatMessage, ChatModel, ChatRequest, ChatResponse, TokenUsage, ToolCall, ToolDefinition};
use crate::config::LlmConfig;
use crate::security::SecretValue;
use crate::{Config, TeamsError};

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiChatModel {
    client: Client,
    endpoint: String,
    api_key: SecretValue,
    model: String,
    temperature: Option<f32>,
    retry_config: RetryConfig,
}

impl OpenAiChatModel {
    pub fn new(settings: &LlmConfig, api_key: SecretValue) -> Result<Self, TeamsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| {
                TeamsError::InvalidConfiguration(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            retry_config: RetryConfig::with_max_retries(settings.max_retries),
        })
    }

    /// Build the client from loaded configuration, reading the key from the environment.
    pub fn from_config(config: &Config) -> Result<Self, TeamsError> {
        Self::new(&config.llm, config.llm_api_key()?)
    }

    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    fn create_error(status: u16, body: &str, retry_after: Option<Duration>) -> LlmError {
        match classify_http_status(status) {
            LlmErrorKind::RateLimited => LlmError::rate_limited(body.to_string(), retry_after),
            LlmErrorKind::ClientError => LlmError::client_error(status, body.to_string()),
            _ => LlmError::server_error(status, body.to_string()),
        }
    }

    fn wire_request<'a>(&'a self, request: &'a ChatRequest) -> WireRequest<'a> {
        WireRequest {
            model: &self.model,
            messages: &request.messages,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(&request.tools)
            },
            response_format: request.response_schema.as_ref().map(|schema| {
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": schema.name,
                        "schema": schema.schema,
                        "strict": true,
                    }
                })
            }),
            temperature: self.temperature,
        }
    }

    async fn execute_request(&self, request: &WireRequest<'_>) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::network_error(format!("request timeout: {err}"))
                } else if err.is_connect() {
                    LlmError::network_error(format!("connection failed: {err}"))
                } else {
                    LlmError::network_error(format!("request failed: {err}"))
                }
            })?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|err| LlmError::network_error(format!("failed to read body: {err}")))?;

        if !status.is_success() {
            return Err(Self::create_error(status.as_u16(), &body, retry_after));
        }

        parse_completion(&body)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let wire = self.wire_request(&request);
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            match self.execute_request(&wire).await {
                Ok(response) => {
                    debug!(
                        model = %self.model,
                        attempt,
                        tool_calls = response.tool_calls.len(),
                        "chat completion succeeded"
                    );
                    return Ok(response);
                }
                Err(err)
                    if self.retry_config.should_retry(&err, attempt)
                        && started.elapsed() < self.retry_config.max_retry_duration =>
                {
                    let delay = err.suggested_delay(attempt);
                    warn!(
                        model = %self.model,
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "chat completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

fn parse_completion(body: &str) -> Result<ChatResponse, LlmError> {
    let parsed: WireResponse = serde_json::from_str(body)
        .map_err(|err| LlmError::parse_error(format!("failed to parse response: {err}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::parse_error("no choices in response".to_string()))?;

    Ok(ChatResponse {
        content: choice.message.content,
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
        finish_reason: choice.finish_reason,
        usage: parsed.usage,
    })
}
