// src/llm/types.rs
// Chat-completion request shape and the HTTP transport

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::config::LlmConfig;

/// One outbound chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub model: String,
}

/// Transport-level failures, split by retryability.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Network-level failure (connect, reset, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx status from the endpoint.
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx with a body that doesn't look like a chat completion.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The local rate limiter starved the call past its deadline; no
    /// request went out.
    #[error("rate-limit wait exceeded the call deadline")]
    Throttled,

    /// The call deadline expired with a request in flight.
    #[error("call deadline exceeded mid-flight")]
    DeadlineExceeded,
}

impl TransportError {
    /// Retry policy: network failures, 5xx, 429, timeouts, and local
    /// throttling retry; client errors and parse failures do not.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Transport(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Malformed(_) => false,
            TransportError::Throttled => true,
            TransportError::DeadlineExceeded => true,
        }
    }

    /// What this failure says about endpoint health, for the circuit
    /// breaker: `Some(false)` is an outage signal, `Some(true)` means the
    /// endpoint answered (a 4xx or a parse failure), `None` says nothing
    /// (the request never left the process).
    pub fn endpoint_health(&self) -> Option<bool> {
        match self {
            TransportError::Transport(_) => Some(false),
            TransportError::Status { status, .. } if *status == 429 || *status >= 500 => {
                Some(false)
            }
            TransportError::Status { .. } => Some(true),
            TransportError::Malformed(_) => Some(true),
            TransportError::Throttled => None,
            TransportError::DeadlineExceeded => Some(false),
        }
    }
}

/// Wire seam below the client; swapped for a script in tests.
#[async_trait]
pub trait LmTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<String, TransportError>;
}

/// Real transport against a LiteLLM-compatible chat-completion endpoint.
pub struct HttpTransport {
    client: Client,
    api_base: String,
    auth_header: String,
}

impl HttpTransport {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            auth_header: config.auth_header.clone(),
        }
    }
}

#[async_trait]
impl LmTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<String, TransportError> {
        let body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
        });

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Content-Type", "application/json");

        if !self.auth_header.is_empty() {
            builder = builder.header("Authorization", &self.auth_header);
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        debug!(model = %request.model, "LM response received");

        payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| TransportError::Malformed("no choices[0].message.content".to_string()))
    }
}
