//! Middleware pipeline: composable onion wrapping around a single adapter
//! invocation (spec §4.4).
//!
//! Grounded on the teacher's `graph::node_middleware::NodeMiddleware::around_run`
//! (`graph/node_middleware.rs`) for the onion-wrap shape — a middleware
//! receives an `inner` closure and decides whether, and how, to call it.
//! Generalized here from one node-state transform to the full 5-tuple the
//! spec names (`transformOptions`, `wrapExecute`, `transformChunk`,
//! `transformResult`, plus a `name`).

pub mod built_ins;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::adapter::{AdapterOptions, AdapterResult, Chunk};

pub use built_ins::{
    cache::CachingMiddleware, cost::CostTrackingMiddleware, logging::LoggingMiddleware,
    rate_limit::RateLimitMiddleware, redact::RedactMiddleware, retry::RetryMiddleware,
    timeout::TimeoutMiddleware, validation::ValidationMiddleware,
};

/// The thing each `wrapExecute` layer may call (zero, one, or several times —
/// retry needs repeated calls) to reach the next layer inward (spec §4.4).
/// `Arc<dyn Fn>` rather than `FnOnce`: the retry built-in re-invokes the
/// inner chain on each attempt with the same resolved options.
pub type DoExecute =
    Arc<dyn Fn(AdapterOptions) -> Pin<Box<dyn Future<Output = AdapterResult> + Send>> + Send + Sync>;

/// A single middleware in the pipeline. Every hook is optional; an
/// implementation only overrides the ones it needs. Default impls are the
/// identity (spec §4.4 "Null/undefined entries are filtered").
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    /// Name used to build the pipeline's composed name (`"a+b+c"`).
    fn name(&self) -> Option<&str> {
        None
    }

    /// Transforms the accumulated options before execution.
    fn transform_options(&self, options: AdapterOptions) -> AdapterOptions {
        options
    }

    /// Wraps the call to the inner layer. Must call (or choose not to call)
    /// `do_execute` to reach the next layer.
    async fn wrap_execute(&self, options: AdapterOptions, do_execute: DoExecute) -> AdapterResult {
        do_execute(options).await
    }

    /// Transforms one streamed chunk.
    fn transform_chunk(&self, chunk: Chunk) -> Chunk {
        chunk
    }

    /// Transforms the final result after `wrap_execute` returns.
    fn transform_result(&self, result: AdapterResult) -> AdapterResult {
        result
    }
}

/// A composed pipeline of middlewares, applied in the order given (spec
/// §4.4: "the first middleware is outermost").
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    /// Composed name: non-empty names joined with `+`, in order.
    pub fn composed_name(&self) -> Option<String> {
        let names: Vec<&str> = self.middlewares.iter().filter_map(|m| m.name()).collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join("+"))
        }
    }

    /// Applies every `transform_options`, left to right.
    pub fn transform_options(&self, mut options: AdapterOptions) -> AdapterOptions {
        for m in &self.middlewares {
            options = m.transform_options(options);
        }
        options
    }

    /// Applies every `transform_chunk`, in order (`A ∘ B`).
    pub fn transform_chunk(&self, mut chunk: Chunk) -> Chunk {
        for m in &self.middlewares {
            chunk = m.transform_chunk(chunk);
        }
        chunk
    }

    /// Applies every `transform_result`, left to right.
    pub fn transform_result(&self, mut result: AdapterResult) -> AdapterResult {
        for m in &self.middlewares {
            result = m.transform_result(result);
        }
        result
    }

    /// Runs the full onion around `execute`: the first middleware is
    /// outermost, so its `wrap_execute` is entered first and exited last.
    pub async fn run<F>(&self, options: AdapterOptions, execute: F) -> AdapterResult
    where
        F: Fn(AdapterOptions) -> Pin<Box<dyn Future<Output = AdapterResult> + Send>>
            + Send
            + Sync
            + 'static,
    {
        let options = self.transform_options(options);
        let chain = self.build_chain(execute);
        let result = chain(options).await;
        self.transform_result(result)
    }

    fn build_chain<F>(&self, execute: F) -> DoExecute
    where
        F: Fn(AdapterOptions) -> Pin<Box<dyn Future<Output = AdapterResult> + Send>>
            + Send
            + Sync
            + 'static,
    {
        let mut chain: DoExecute = Arc::new(execute);
        for middleware in self.middlewares.iter().rev() {
            let middleware = middleware.clone();
            let inner = chain;
            chain = Arc::new(move |options: AdapterOptions| {
                let middleware = middleware.clone();
                let inner = inner.clone();
                Box::pin(async move { middleware.wrap_execute(options, inner).await })
            });
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{StopReason, TokensUsed};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok_result(output: &str) -> AdapterResult {
        AdapterResult {
            output: output.to_string(),
            structured: None,
            tokens_used: TokensUsed::default(),
            turns_used: 1,
            duration_ms: 0,
            stop_reason: StopReason::Completed,
        }
    }

    struct Tagging(&'static str, Arc<std::sync::Mutex<Vec<&'static str>>>);

    #[async_trait::async_trait]
    impl Middleware for Tagging {
        fn name(&self) -> Option<&str> {
            Some(self.0)
        }

        async fn wrap_execute(&self, options: AdapterOptions, do_execute: DoExecute) -> AdapterResult {
            self.1.lock().unwrap().push(self.0);
            let before_label = format!("{}-before", self.0);
            let before_label: &'static str = Box::leak(before_label.into_boxed_str());
            self.1.lock().unwrap().push(before_label);
            let result = do_execute(options).await;
            let after_label = format!("{}-after", self.0);
            let after_label: &'static str = Box::leak(after_label.into_boxed_str());
            self.1.lock().unwrap().push(after_label);
            result
        }
    }

    #[tokio::test]
    async fn wrap_execute_onion_order_outer_first() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            Arc::new(Tagging("A", log.clone())),
            Arc::new(Tagging("B", log.clone())),
        ]);
        let _ = pipeline
            .run(AdapterOptions::new("x"), |_| Box::pin(async { ok_result("done") }))
            .await;
        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec!["A", "A-before", "B", "B-before", "B-after", "A-after"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_layers() {
        let called = Arc::new(AtomicUsize::new(0));
        struct ShortCircuit;
        #[async_trait::async_trait]
        impl Middleware for ShortCircuit {
            async fn wrap_execute(&self, _options: AdapterOptions, _do_execute: DoExecute) -> AdapterResult {
                ok_result("short-circuited")
            }
        }
        let c2 = called.clone();
        let pipeline = Pipeline::new(vec![Arc::new(ShortCircuit)]);
        let result = pipeline
            .run(AdapterOptions::new("x"), move |_| {
                c2.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { ok_result("inner") })
            })
            .await;
        assert_eq!(result.output, "short-circuited");
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn composed_name_joins_with_plus() {
        let pipeline = Pipeline::new(vec![
            Arc::new(Tagging("A", Arc::new(std::sync::Mutex::new(Vec::new())))),
            Arc::new(Tagging("B", Arc::new(std::sync::Mutex::new(Vec::new())))),
        ]);
        assert_eq!(pipeline.composed_name(), Some("A+B".to_string()));
    }

    #[test]
    fn transform_chunk_applies_in_order() {
        struct Suffix(&'static str);
        #[async_trait::async_trait]
        impl Middleware for Suffix {
            fn transform_chunk(&self, mut chunk: Chunk) -> Chunk {
                chunk.content.push_str(self.0);
                chunk
            }
        }
        let pipeline = Pipeline::new(vec![Arc::new(Suffix("-a")), Arc::new(Suffix("-b"))]);
        let chunk = pipeline.transform_chunk(Chunk {
            content: "x".into(),
            is_final: false,
        });
        assert_eq!(chunk.content, "x-a-b");
    }
}
