// src/llm/client.rs
// The per-process LM coordinator: token bucket, circuit breaker, retries,
// response cache, per-call deadline. This is the only long-lived mutable
// state in the core.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::circuit_breaker::{BreakerDecision, CircuitBreaker};
use super::types::{ChatRequest, HttpTransport, LmTransport, TransportError};
use crate::cache::{Cache, Namespace, keys};
use crate::config::LlmConfig;
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::llm::ChatCompleter;
use crate::metrics;
use crate::utils::RateLimiter;

pub struct LmClient {
    transport: Arc<dyn LmTransport>,
    cache: Cache,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    config: LlmConfig,
}

impl LmClient {
    pub fn new(config: LlmConfig, cache: Cache) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config));
        Self::with_transport(config, cache, transport)
    }

    /// Build over an arbitrary transport (tests script failures with this).
    pub fn with_transport(
        config: LlmConfig,
        cache: Cache,
        transport: Arc<dyn LmTransport>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            transport,
            cache,
            limiter: RateLimiter::new(config.rate_limit_per_minute)?,
            breaker: CircuitBreaker::new(
                config.breaker_failure_threshold,
                Duration::from_secs(config.breaker_cooldown_secs),
            ),
            config,
        })
    }

    pub fn circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    /// Send with bounded retries under one call deadline.
    ///
    /// Every attempt first queues for a rate-limiter token out of the
    /// remaining budget; transmission gets what is left after that, and a
    /// retry backoff that would not fit the budget returns the last error
    /// instead of burning the tail on a sleep. Token starvation surfaces
    /// as `Throttled`, distinct from the endpoint timing out mid-flight.
    async fn send_with_retry(&self, request: &ChatRequest) -> Result<String, TransportError> {
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.call_deadline_secs);
        let mut backoff = Duration::from_millis(self.config.retry_base_ms);
        let cap = Duration::from_millis(self.config.retry_cap_ms);
        let mut attempt = 1;

        loop {
            let budget = deadline.saturating_duration_since(tokio::time::Instant::now());
            if !self.limiter.acquire_within(budget).await {
                return Err(TransportError::Throttled);
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let attempt_result =
                match tokio::time::timeout(remaining, self.transport.send(request)).await {
                    Ok(result) => result,
                    Err(_) => return Err(TransportError::DeadlineExceeded),
                };

            match attempt_result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.config.retry_max_attempts => {
                    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                    if backoff >= remaining {
                        return Err(e);
                    }

                    warn!(attempt, "LM call failed, retrying in {:?}: {}", backoff, e);
                    metrics::record_llm_retry();
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(cap);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ChatCompleter for LmClient {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> CoreResult<String> {
        match self.breaker.check() {
            BreakerDecision::Proceed => {}
            BreakerDecision::RejectOpen => {
                // Fail fast with no outbound call; not worth re-enqueueing
                // until the cooldown admits a probe.
                return Err(CoreError::new(ErrorKind::LmUnavailable, "LM circuit is open"));
            }
            BreakerDecision::RejectProbeInFlight => {
                return Err(CoreError::transient(
                    ErrorKind::LmUnavailable,
                    "LM circuit is half-open, probe in flight",
                ));
            }
        }

        let request = ChatRequest {
            system: system.to_string(),
            user: user.to_string(),
            temperature,
            model: self.config.model.clone(),
        };

        // Only deterministic calls are cached; higher temperatures bypass.
        let cacheable = self.config.enable_cache && temperature == 0.0;
        let key = keys::lm_response_key(system, user, temperature, &self.config.model);

        if cacheable {
            if let Some(text) = self.cache.get_json::<String>(Namespace::LmResponse, &key).await {
                debug!(key = %&key[..8], "LM response served from cache");
                return Ok(text);
            }
        }

        match self.send_with_retry(&request).await {
            Err(e) => {
                match e.endpoint_health() {
                    Some(false) => self.breaker.record_failure(),
                    // The endpoint answered; the probe (if any) resolves.
                    Some(true) => self.breaker.record_success(),
                    // Throttled locally: no signal either way.
                    None => {}
                }
                metrics::record_llm_call(&self.config.model, false);

                let transient = e.is_transient();
                Err(CoreError {
                    kind: ErrorKind::LmUnavailable,
                    message: e.to_string(),
                    transient,
                })
            }
            Ok(text) => {
                self.breaker.record_success();
                metrics::record_llm_call(&self.config.model, true);

                if cacheable {
                    self.cache
                        .put_json(
                            Namespace::LmResponse,
                            &key,
                            &text,
                            Duration::from_secs(self.config.cache_ttl_secs),
                        )
                        .await;
                }

                Ok(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    fn config() -> LlmConfig {
        LlmConfig {
            api_base: "http://localhost:4000".into(),
            auth_header: String::new(),
            model: "test-model".into(),
            rate_limit_per_minute: 10_000,
            breaker_failure_threshold: 3,
            breaker_cooldown_secs: 30,
            retry_max_attempts: 3,
            retry_base_ms: 1,
            retry_cap_ms: 4,
            call_deadline_secs: 5,
            enable_cache: true,
            cache_ttl_secs: 300,
        }
    }

    fn client(cfg: LlmConfig, transport: Arc<MockTransport>) -> LmClient {
        LmClient::with_transport(cfg, Cache::in_memory(100), transport).unwrap()
    }

    #[tokio::test]
    async fn test_temperature_zero_hits_cache() {
        let transport = MockTransport::new();
        transport.push_ok("SELECT 1;");
        let client = client(config(), transport.clone());

        let first = client.complete("sys", "user", 0.0).await.unwrap();
        let second = client.complete("sys", "user", 0.0).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_nonzero_temperature_bypasses_cache() {
        let transport = MockTransport::new();
        transport.push_ok("one");
        transport.push_ok("two");
        let client = client(config(), transport.clone());

        assert_eq!(client.complete("sys", "user", 0.5).await.unwrap(), "one");
        assert_eq!(client.complete("sys", "user", 0.5).await.unwrap(), "two");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_retry_then_succeed() {
        let transport = MockTransport::new();
        transport.push_err(TransportError::Status { status: 503, body: "unavailable".into() });
        transport.push_err(TransportError::Transport("reset".into()));
        transport.push_ok("recovered");
        let client = client(config(), transport.clone());

        assert_eq!(client.complete("sys", "user", 0.0).await.unwrap(), "recovered");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_client_errors_do_not_retry() {
        let transport = MockTransport::new();
        transport.push_err(TransportError::Status { status: 400, body: "bad request".into() });
        let client = client(config(), transport.clone());

        let err = client.complete("sys", "user", 0.0).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::LmUnavailable);
        assert!(!err.transient);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold_and_blocks_outbound() {
        // Exhausted script keeps failing with transport errors
        let transport = MockTransport::new();
        let mut cfg = config();
        cfg.retry_max_attempts = 1;
        let client = client(cfg, transport.clone());

        for _ in 0..3 {
            let _ = client.complete("sys", "user", 0.0).await.unwrap_err();
        }

        assert!(client.circuit_open());
        let calls_before = transport.calls();

        let err = client.complete("sys", "user", 0.0).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::LmUnavailable);
        assert!(!err.transient);
        // No outbound call while open
        assert_eq!(transport.calls(), calls_before);
    }

    #[tokio::test]
    async fn test_probe_after_cooldown_closes_breaker() {
        let transport = MockTransport::new();
        transport.push_err(TransportError::Transport("down".into()));
        transport.push_ok("back up");
        let mut cfg = config();
        cfg.breaker_failure_threshold = 1;
        cfg.breaker_cooldown_secs = 0;
        cfg.retry_max_attempts = 1;
        let client = client(cfg, transport.clone());

        let _ = client.complete("sys", "user", 0.5).await.unwrap_err();
        assert!(client.circuit_open());

        // Zero cooldown: the next call is the probe, and it succeeds
        assert_eq!(client.complete("sys", "user", 0.5).await.unwrap(), "back up");
        assert!(!client.circuit_open());
    }

    #[tokio::test]
    async fn test_deadline_cancels_call() {
        struct SlowTransport;

        #[async_trait]
        impl LmTransport for SlowTransport {
            async fn send(&self, _request: &ChatRequest) -> Result<String, TransportError> {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok("too late".into())
            }
        }

        let mut cfg = config();
        cfg.call_deadline_secs = 1;
        let client =
            LmClient::with_transport(cfg, Cache::in_memory(100), Arc::new(SlowTransport)).unwrap();

        tokio::time::pause();
        let err = client.complete("sys", "user", 0.0).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::LmUnavailable);
        assert!(err.transient);
    }

    #[tokio::test]
    async fn test_rate_limit_starvation_does_not_count_against_breaker() {
        let transport = MockTransport::new();
        transport.push_ok("first");

        let mut cfg = config();
        cfg.rate_limit_per_minute = 1;
        cfg.breaker_failure_threshold = 1;
        cfg.call_deadline_secs = 1;
        let client = client(cfg, transport.clone());

        assert_eq!(client.complete("sys", "user", 0.5).await.unwrap(), "first");

        // Bucket drained: the second call starves past its deadline
        let err = client.complete("sys", "user", 0.5).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::LmUnavailable);
        assert!(err.transient);
        assert!(err.message.contains("rate-limit"));

        // No request went out, and starvation is not an outage signal
        assert_eq!(transport.calls(), 1);
        assert!(!client.circuit_open());
    }
}
