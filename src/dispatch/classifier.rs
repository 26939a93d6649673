// src/dispatch/classifier.rs
// Pool routing: a cacheable LM call with a local heuristic fallback

use std::sync::Arc;
use tracing::debug;

use super::types::PoolKind;
use crate::agent::prompts;
use crate::llm::ChatCompleter;

/// Routes a job to a worker pool at submit time. With no LM attached,
/// everything goes to the standard pool.
#[derive(Clone, Default)]
pub struct Classifier {
    lm: Option<Arc<dyn ChatCompleter>>,
}

impl Classifier {
    /// All-to-standard routing.
    pub fn standard_only() -> Self {
        Self { lm: None }
    }

    /// LM-assisted routing. The call runs at temperature 0, so the LM
    /// client caches repeated questions.
    pub fn with_lm(lm: Arc<dyn ChatCompleter>) -> Self {
        Self { lm: Some(lm) }
    }

    pub async fn route(&self, question: &str) -> PoolKind {
        let Some(lm) = &self.lm else {
            return PoolKind::Standard;
        };

        let (system, user) = prompts::classify(question);

        match lm.complete(&system, &user, 0.0).await {
            Ok(reply) => {
                let reply = reply.to_lowercase();
                let pool = if reply.contains("complex") {
                    PoolKind::Complex
                } else if reply.contains("simple") {
                    PoolKind::Simple
                } else {
                    PoolKind::Standard
                };
                debug!(pool = pool.as_str(), "LM-classified question");
                pool
            }
            Err(e) => {
                debug!("Classifier LM call failed, using heuristic: {}", e);
                heuristic(question)
            }
        }
    }
}

/// Crude local routing by question shape.
fn heuristic(question: &str) -> PoolKind {
    let lowered = question.to_lowercase();
    let words = lowered.split_whitespace().count();

    let complex_markers = ["trend", "compare", "correlat", "per month", "per week", "breakdown", "group"];
    if words > 25 || complex_markers.iter().any(|m| lowered.contains(m)) {
        return PoolKind::Complex;
    }

    let simple_markers = ["how many", "count", "total number"];
    if words <= 8 && simple_markers.iter().any(|m| lowered.contains(m)) {
        return PoolKind::Simple;
    }

    PoolKind::Standard
}
