//! # Smithers
//!
//! An agent-orchestration runtime driven by declarative plan trees. A host
//! renders a tree of [`Node`]s (`claude`, `codex`, `review`, `human`, `phase`,
//! ...); the [`ExecutionEngine`] re-renders it every frame, dispatches
//! executable nodes through a composable [`middleware`] pipeline onto an
//! [`Adapter`], and persists everything to an embedded [`Store`].
//!
//! ## Design principles
//!
//! - **Re-render, don't mutate**: the engine never owns the tree between
//!   frames; it calls `rerender()` fresh every frame and diffs by content
//!   hash ([`content_hash`]) to decide what changed.
//! - **One store, reactively subscribed**: [`Store`] is the only shared
//!   mutable resource; the [`human`] coordinator and [`review`] gate both
//!   suspend on reactive row-filter subscriptions rather than polling loops.
//! - **Onion middleware**: the first middleware in a [`Pipeline`] is
//!   outermost, matching the teacher's `NodeMiddleware::around_run` shape.
//!
//! ## Main modules
//!
//! - [`tree`]: [`Node`], [`content_hash`], [`to_canonical_xml`] — the plan tree data model.
//! - [`store`]: [`Store`] — embedded SQL store with reactive row-filter subscriptions.
//! - [`state_manager`]: [`StateManager`] — KV façade with an audit log and time-travel replay.
//! - [`adapter`]: [`Adapter`] trait, [`ProcessAdapter`], [`MockAdapter`] — one per CLI backend.
//! - [`middleware`]: [`Middleware`], [`Pipeline`] — retry, timeout, rate-limit, cache, redact,
//!   cost-tracking, validation, logging built-ins.
//! - [`engine`]: [`ExecutionEngine`] — the per-frame drive loop, [`TerminationReason`].
//! - [`human`]: [`HumanCoordinator`] — suspend-and-resume human-in-the-loop gate.
//! - [`review`]: [`ReviewGate`] — structured-output approve/reject gate for commits/diffs/PRs.
//! - [`debug`]: [`DebugBus`] — session/frame/node lifecycle event stream.
//! - [`config`]: Config summaries ([`RunConfigSummary`], [`build_config_summary`]).
//! - [`snapshot`]: [`VcsSnapshotter`], [`guard_tool_call`] — optional before/after
//!   VCS snapshotting around write-classified tool calls.
//!
//! Key types are re-exported at crate root: `use smithers::{ExecutionEngine, Node, Store};`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smithers::{Adapter, ExecutionEngine, ExecutionOptions, MockAdapter, Node, Pipeline, Store};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(Store::open("plan.db").unwrap());
//! store
//!     .run(
//!         "INSERT INTO executions (id, file_path, created_at) VALUES ('exec-1', 'plan.rsx', 0)",
//!         vec![],
//!     )
//!     .await
//!     .unwrap();
//! let adapter: Arc<dyn Adapter> = Arc::new(MockAdapter::echo("mock", "done"));
//! let engine = ExecutionEngine::new(
//!     store,
//!     "exec-1",
//!     adapter,
//!     Arc::new(Pipeline::new(vec![])),
//!     Arc::new(smithers::DebugBus::disabled()),
//!     CancellationToken::new(),
//! );
//! let rerender: smithers::RerenderFn = Arc::new(|| {
//!     Box::pin(async { Ok(Node::new("root")) })
//! });
//! let result = engine.run(rerender, ExecutionOptions::default()).await;
//! println!("{:?}", result.reason);
//! # }
//! ```

// Primary surface (agent-orchestration runtime): plan tree, store, state
// manager, adapter, middleware pipeline, execution engine, human-in-the-loop
// coordinator, review gate, debug event bus.
pub mod adapter;
pub mod cache;
pub mod config;
pub mod debug;
pub mod engine;
pub mod error;
pub mod human;
pub mod middleware;
pub mod review;
pub mod snapshot;
pub mod state_manager;
pub mod store;
pub mod tree;

pub use adapter::{
    extract_json, Adapter, AdapterOptions, AdapterResult, Chunk, MockAdapter, ProcessAdapter,
    ProgressSender, StopReason, TokensUsed,
};
pub use debug::{DebugBus, DebugEvent, DebugSink, NodeSnapshot};
pub use engine::{ExecutionEngine, ExecutionOptions, ExecutionResult, RerenderFn, TerminationReason};
pub use human::{HumanAnswer, HumanCoordinator, HumanStatus};
pub use middleware::{
    CachingMiddleware, CostTrackingMiddleware, LoggingMiddleware, Middleware, Pipeline,
    RateLimitMiddleware, RedactMiddleware, RetryMiddleware, TimeoutMiddleware, ValidationMiddleware,
};
pub use review::{IssueSeverity, ReviewGate, ReviewIssue, ReviewRequest, ReviewVerdict, TargetKind};
pub use snapshot::{
    classify_tool_call, guard_tool_call, prune_snapshots, SnapshotError, SnapshotPhase,
    ToolCallClass, VcsSnapshotter, VcsState,
};
pub use state_manager::{StateManager, Transition};
pub use store::{Param, Row, Store, StoreError, SubscriptionId};
pub use tree::{
    content_hash, parse_plan_xml, to_canonical_xml, ContentHash, Node, NodeKey, PropValue,
    EXECUTABLE_TYPES, KNOWN_TYPES, RESERVED_PROP_NAMES, ROOT, SMITHERS_STOP, STOP_ALIAS, TEXT,
};
pub use error::SmithersError;

pub use cache::{Cache, CacheError, InMemoryCache};
pub use config::{
    build_config_summary, AdapterConfigSummary, ConfigSection, EngineConfigSummary,
    MiddlewareConfigSummary, RunConfigSummary, RunConfigSummarySource, StoreConfigSummary,
};

/// When running `cargo test -p smithers`, initializes tracing from `RUST_LOG` so that
/// unit tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
