// src/llm/mod.rs
// Language-model client: rate limited, circuit broken, retrying, cached

pub mod circuit_breaker;
pub mod client;
pub mod parse;
pub mod types;

pub use circuit_breaker::CircuitBreaker;
pub use client::LmClient;
pub use parse::LmJson;
pub use types::{ChatRequest, HttpTransport, LmTransport, TransportError};

use async_trait::async_trait;

use crate::error::CoreResult;

/// The completion seam the pipeline depends on. `LmClient` is the
/// production implementation; tests script `testing::MockLm`.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> CoreResult<String>;

    /// Complete and defensively parse the reply as JSON. Free-text replies
    /// come back as `LmJson::Textual` rather than an error.
    async fn complete_json(&self, system: &str, user: &str, temperature: f32) -> CoreResult<LmJson> {
        let text = self.complete(system, user, temperature).await?;
        Ok(parse::extract_json(&text))
    }
}
