//! Logging middleware (spec §4.4): emits start/finish/error records via
//! `tracing`, grounded on the `tracing::info!` call sites in
//! `cli_run/agent.rs`.

use std::time::Instant;

use async_trait::async_trait;
use tracing::Level;

use crate::adapter::{AdapterOptions, AdapterResult, StopReason};
use crate::middleware::{DoExecute, Middleware};

pub struct LoggingMiddleware {
    level: Level,
}

impl LoggingMiddleware {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LoggingMiddleware {
    fn log_start(&self, options: &AdapterOptions) {
        match self.level {
            Level::ERROR => tracing::error!(model = ?options.model, prompt_len = options.prompt.len(), "agent invocation started"),
            Level::WARN => tracing::warn!(model = ?options.model, prompt_len = options.prompt.len(), "agent invocation started"),
            Level::DEBUG => tracing::debug!(model = ?options.model, prompt_len = options.prompt.len(), "agent invocation started"),
            Level::TRACE => tracing::trace!(model = ?options.model, prompt_len = options.prompt.len(), "agent invocation started"),
            Level::INFO => tracing::info!(model = ?options.model, prompt_len = options.prompt.len(), "agent invocation started"),
        }
    }

    fn log_finish(&self, result: &AdapterResult, elapsed_ms: u64) {
        if result.stop_reason == StopReason::Error {
            tracing::error!(elapsed_ms, output = %result.output, "agent invocation failed");
            return;
        }
        match self.level {
            Level::ERROR => tracing::error!(elapsed_ms, stop_reason = ?result.stop_reason, "agent invocation finished"),
            Level::WARN => tracing::warn!(elapsed_ms, stop_reason = ?result.stop_reason, "agent invocation finished"),
            Level::DEBUG => tracing::debug!(elapsed_ms, stop_reason = ?result.stop_reason, "agent invocation finished"),
            Level::TRACE => tracing::trace!(elapsed_ms, stop_reason = ?result.stop_reason, "agent invocation finished"),
            Level::INFO => tracing::info!(elapsed_ms, stop_reason = ?result.stop_reason, "agent invocation finished"),
        }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> Option<&str> {
        Some("logging")
    }

    async fn wrap_execute(&self, options: AdapterOptions, do_execute: DoExecute) -> AdapterResult {
        let start = Instant::now();
        self.log_start(&options);
        let result = do_execute(options).await;
        self.log_finish(&result, start.elapsed().as_millis() as u64);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TokensUsed;
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
    async fn passes_the_result_through_unchanged() {
        let pipeline = Pipeline::new(vec![Arc::new(LoggingMiddleware::default())]);
        let result = pipeline
            .run(AdapterOptions::new("x"), |_| Box::pin(async { ok_result() }))
            .await;
        assert_eq!(result.output, "ok");
        assert_eq!(result.stop_reason, StopReason::Completed);
    }

    #[tokio::test]
    async fn logs_errors_without_altering_them() {
        let pipeline = Pipeline::new(vec![Arc::new(LoggingMiddleware::default())]);
        let result = pipeline
            .run(AdapterOptions::new("x"), |_| {
                Box::pin(async { AdapterResult::error("boom", 5) })
            })
            .await;
        assert_eq!(result.stop_reason, StopReason::Error);
        assert_eq!(result.output, "boom");
    }
}
