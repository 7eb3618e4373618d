use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::session::Message;

pub const DEFAULT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion service returned no text")]
    EmptyReply,
    #[error("completion did not finish within {0:?}")]
    Timeout(Duration),
    #[error("completion workers are shutting down")]
    Closed,
    #[error("{0}")]
    Other(String),
}

/// Black-box text completion over a chat history.
///
/// Implementations are shared between background workers, so they take `&self`
/// and hand back a boxed future that can be moved onto the runtime.
pub trait TextCompletion: Send + Sync {
    fn complete<'a>(&'a self, messages: &'a [Message])
    -> BoxFuture<'a, Result<String, BackendError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_COMPLETIONS_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Client for OpenAI-style `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    config: BackendConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self { http, config })
    }

    async fn request(&self, messages: &[Message]) -> Result<String, BackendError> {
        let body = json!({
            "model": self.config.model,
            "messages": messages,
        });

        let mut request = self.http.post(&self.config.url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        extract_reply(&payload)
    }
}

impl TextCompletion for ChatCompletionsClient {
    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
    ) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(self.request(messages))
    }
}

fn extract_reply(payload: &Value) -> Result<String, BackendError> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(BackendError::EmptyReply);
    }
    Ok(content.to_string())
}
