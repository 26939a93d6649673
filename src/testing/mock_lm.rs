// src/testing/mock_lm.rs
// Scripted chat completer: replies play back in order

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::llm::ChatCompleter;

/// Plays back a queue of scripted replies, one per `complete` call.
/// An exhausted script fails loudly so tests catch unexpected calls.
#[derive(Default)]
pub struct MockLm {
    replies: Mutex<VecDeque<CoreResult<String>>>,
    calls: AtomicU32,
    delay: Mutex<Option<Duration>>,
    /// Most recent prompts, for asserting on prompt content.
    prompts: Mutex<Vec<(String, String, String)>>,
}

impl MockLm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text reply.
    pub fn push(&self, text: &str) {
        self.replies.lock().push_back(Ok(text.to_string()));
    }

    /// Queue a failure.
    pub fn push_err(&self, err: CoreError) {
        self.replies.lock().push_back(Err(err));
    }

    /// Simulate latency on every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Total `complete` calls observed.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Recorded `(system, user, temperature)` prompts, oldest first.
    pub fn prompts(&self) -> Vec<(String, String, String)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ChatCompleter for MockLm {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> CoreResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push((
            system.to_string(),
            user.to_string(),
            format!("{:.2}", temperature),
        ));

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.replies.lock().pop_front().unwrap_or_else(|| {
            Err(CoreError::new(
                ErrorKind::InternalError,
                "mock LM script exhausted",
            ))
        })
    }
}
