//! OpenAI-compatible chat-completions client
//!
//! Works against Ollama, vLLM, llama.cpp server and hosted APIs that expose
//! `POST {endpoint}/chat/completions`.

use super::{LanguageModel, ModelRequest};
use crate::error::ModelCallError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Connection settings for the model endpoint
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL, e.g. `http://localhost:11434/v1`
    pub endpoint: String,
    /// Model name passed in each request
    pub model: String,
    /// Sent as a bearer token when set
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts per call, including the first (transient failures only)
    pub max_attempts: u32,
    /// Pause between attempts
    pub retry_backoff: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "llama3.1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
            max_attempts: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP model client with a per-request timeout and bounded retry
pub struct HttpModel {
    client: reqwest::Client,
    url: Url,
    config: ModelConfig,
}

impl HttpModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelCallError> {
        let url = completions_url(&config.endpoint)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelCallError::Transport {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url,
            config,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call_once(&self, request: &ModelRequest) -> Result<String, ModelCallError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            stream: false,
        };

        let mut builder = self.client.post(self.url.clone()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            let mut end = body.len().min(512);
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
            return Err(ModelCallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.map_error(e))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ModelCallError::EmptyResponse);
        }
        Ok(text)
    }

    fn map_error(&self, err: reqwest::Error) -> ModelCallError {
        if err.is_timeout() {
            ModelCallError::Timeout {
                after_ms: self.config.timeout.as_millis() as u64,
            }
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl LanguageModel for HttpModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelCallError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.call_once(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(attempt, max_attempts, error = %e, "Model call failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `{endpoint}/chat/completions`, tolerating a trailing slash
fn completions_url(endpoint: &str) -> Result<Url, ModelCallError> {
    let invalid = |reason: String| ModelCallError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut base = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("chat/completions")
        .map_err(|e| invalid(e.to_string()))
}
