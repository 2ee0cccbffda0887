//! Validation middleware (spec §4.4): runs a user predicate on the final
//! result, failing it to `stopReason=error` when the predicate rejects.
//! Skipped when the inner execution already errored.

use async_trait::async_trait;

use crate::adapter::{AdapterOptions, AdapterResult, StopReason};
use crate::middleware::{DoExecute, Middleware};

pub type Predicate = Box<dyn Fn(&AdapterResult) -> Result<(), String> + Send + Sync>;

pub struct ValidationMiddleware {
    predicate: Predicate,
}

impl ValidationMiddleware {
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    fn name(&self) -> Option<&str> {
        Some("validation")
    }

    async fn wrap_execute(&self, options: AdapterOptions, do_execute: DoExecute) -> AdapterResult {
        let result = do_execute(options).await;
        if result.stop_reason == StopReason::Error {
            return result;
        }
        match (self.predicate)(&result) {
            Ok(()) => result,
            Err(message) => AdapterResult::error(
                format!("validation failed: {message}"),
                result.duration_ms,
            ),
        }
    }
}
