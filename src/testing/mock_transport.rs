// src/testing/mock_transport.rs
// Scripted LM transport for exercising the real client plumbing

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::llm::{ChatRequest, LmTransport, TransportError};

/// Pops one scripted reply per send; an exhausted script degrades to a
/// transport error so breaker tests can keep failing without rescripting.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Result<String, TransportError>>>,
    calls: AtomicU32,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, text: &str) {
        self.replies.lock().push_back(Ok(text.to_string()));
    }

    pub fn push_err(&self, err: TransportError) {
        self.replies.lock().push_back(Err(err));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Outbound sends observed, including retries.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LmTransport for MockTransport {
    async fn send(&self, _request: &ChatRequest) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Transport("mock transport script exhausted".into())))
    }
}
