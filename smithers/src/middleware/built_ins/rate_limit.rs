//! Rate-limiting middleware: token bucket parameterised by
//! requests-per-minute, blocking or erroring on exhaustion.
//!
//! No teacher module does request throttling; built directly against the
//! documented token-bucket contract, using `tokio::time::sleep` the way the
//! rest of the crate waits on async timers.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::adapter::{AdapterOptions, AdapterResult};
use crate::middleware::{DoExecute, Middleware};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// What happens when the bucket is empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnExhausted {
    /// Waits for the next token instead of rejecting the call.
    Block,
    /// Returns an error result immediately.
    Error,
}

pub struct RateLimitMiddleware {
    capacity: f64,
    refill_per_ms: f64,
    on_exhausted: OnExhausted,
    bucket: Mutex<Bucket>,
}

impl RateLimitMiddleware {
    pub fn new(requests_per_minute: f64, on_exhausted: OnExhausted) -> Self {
        let capacity = requests_per_minute.max(1.0);
        Self {
            capacity,
            refill_per_ms: requests_per_minute / 60_000.0,
            on_exhausted,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Refills and attempts to take one token. Returns the wait needed
    /// before a token becomes available, or `None` if one was taken now.
    fn try_take(&self) -> Option<Duration> {
        let mut bucket = self.bucket.lock().unwrap();
        let now = Instant::now();
        let elapsed_ms = now.duration_since(bucket.last_refill).as_secs_f64() * 1000.0;
        bucket.tokens = (bucket.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_ms = (deficit / self.refill_per_ms).max(0.0);
            Some(Duration::from_millis(wait_ms.ceil() as u64))
        }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> Option<&str> {
        Some("rate-limit")
    }

    async fn wrap_execute(&self, options: AdapterOptions, do_execute: DoExecute) -> AdapterResult {
        loop {
            match self.try_take() {
                None => return do_execute(options).await,
                Some(wait) => match self.on_exhausted {
                    OnExhausted::Error => {
                        return AdapterResult::error("rate limit exceeded", 0);
                    }
                    OnExhausted::Block => tokio::time::sleep(wait).await,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{StopReason, TokensUsed};
    use crate::middleware::Pipeline;
    use std::sync::Arc;

    fn ok_result() -> AdapterResult {
        AdapterResult {
            output: "ok".into(),
            structured: None,
            tokens_used: TokensUsed::default(),
            turns_used: 1,
            duration_ms: 0,
            stop_reason: StopReason::Completed,
        }
    }

    #[tokio::test]
    async fn errors_immediately_when_exhausted_and_configured_to_error() {
        let mw = RateLimitMiddleware::new(1.0, OnExhausted::Error);
        let pipeline = Pipeline::new(vec![Arc::new(mw)]);
        let first = pipeline
            .run(AdapterOptions::new("x"), |_| Box::pin(async { ok_result() }))
            .await;
        assert_eq!(first.stop_reason, StopReason::Completed);
        let second = pipeline
            .run(AdapterOptions::new("x"), |_| Box::pin(async { ok_result() }))
            .await;
        assert_eq!(second.stop_reason, StopReason::Error);
    }

    #[tokio::test]
    async fn blocks_until_a_token_refills() {
        let mw = RateLimitMiddleware::new(60_000.0, OnExhausted::Block);
        let pipeline = Pipeline::new(vec![Arc::new(mw)]);
        for _ in 0..3 {
            let result = pipeline
                .run(AdapterOptions::new("x"), |_| Box::pin(async { ok_result() }))
                .await;
            assert_eq!(result.stop_reason, StopReason::Completed);
        }
    }
}
