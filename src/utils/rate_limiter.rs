// src/utils/rate_limiter.rs
// Deadline-aware token bucket for outbound LM calls

use anyhow::Result;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter as GovRateLimiter};

/// Fair token bucket shared by every worker in the process.
///
/// Callers queue for a token only as long as their per-call deadline
/// allows: a caller whose budget elapses while waiting gives up without a
/// token, so a saturated bucket cannot hold LM calls past the point where
/// their result would be discarded anyway.
pub struct RateLimiter {
    bucket: GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    jitter: Jitter,
}

impl RateLimiter {
    /// Create a new rate limiter with requests per minute
    pub fn new(requests_per_minute: u32) -> Result<Self> {
        let quota = Quota::per_minute(
            NonZeroU32::new(requests_per_minute)
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limit"))?,
        );

        Ok(Self {
            bucket: GovRateLimiter::direct(quota),
            jitter: Jitter::new(Duration::from_millis(10), Duration::from_millis(100)),
        })
    }

    /// Suspend until a token is granted or the budget elapses.
    ///
    /// Returns false when the wait outlived the budget; no token is
    /// consumed in that case.
    pub async fn acquire_within(&self, budget: Duration) -> bool {
        tokio::time::timeout(budget, self.bucket.until_ready_with_jitter(self.jitter))
            .await
            .is_ok()
    }
}
