//! Retry middleware (spec §4.4).
//!
//! The source carries two retry-middleware signature variants; per spec §9
//! Open Question 1, the `({doExecute, options})` shape is canonical, which
//! is exactly the `wrap_execute(options, do_execute)` shape this trait
//! already exposes — no special-casing needed here.

use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::{AdapterOptions, AdapterResult, StopReason};
use crate::middleware::{DoExecute, Middleware};

#[derive(Clone, Copy, Debug)]
pub enum Backoff {
    Constant,
    Linear,
    Exponential,
}

impl Backoff {
    fn delay(&self, attempt: u32, base: Duration) -> Duration {
        match self {
            Backoff::Constant => base,
            Backoff::Linear => base * (attempt + 1),
            Backoff::Exponential => base * 2u32.saturating_pow(attempt),
        }
    }
}

/// Retries a failing execution up to `max_retries` additional attempts
/// (spec §8: "exhausts exactly `maxRetries + 1` attempts"), honouring a
/// `retry_on` predicate and invoking `on_retry(attempt, output, delay)`
/// before each retry's backoff sleep.
pub struct RetryMiddleware {
    pub max_retries: u32,
    pub backoff: Backoff,
    pub base_delay: Duration,
    pub retry_on: Box<dyn Fn(&AdapterResult) -> bool + Send + Sync>,
    pub on_retry: Box<dyn Fn(u32, &AdapterResult, Duration) + Send + Sync>,
}

impl RetryMiddleware {
    pub fn new(max_retries: u32, backoff: Backoff, base_delay: Duration) -> Self {
        Self {
            max_retries,
            backoff,
            base_delay,
            retry_on: Box::new(|result| result.stop_reason == StopReason::Error),
            on_retry: Box::new(|_, _, _| {}),
        }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> Option<&str> {
        Some("retry")
    }

    async fn wrap_execute(&self, options: AdapterOptions, do_execute: DoExecute) -> AdapterResult {
        let mut attempt = 0;
        let mut last = do_execute(options.clone()).await;
        while attempt < self.max_retries && (self.retry_on)(&last) {
            let delay = self.backoff.delay(attempt, self.base_delay);
            (self.on_retry)(attempt + 1, &last, delay);
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
            last = do_execute(options.clone()).await;
        }
        last
    }
}
