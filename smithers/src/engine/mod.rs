//! Execution engine (spec §4.6): the per-frame loop that renders a plan
//! tree, resolves human/review gates, and dispatches executable nodes
//! through the adapter pipeline.
//!
//! Grounded on the teacher's `graph::CompiledStateGraph::invoke`/`stream`
//! drive loop (`graph/mod.rs`) for the "render, inspect, step, loop again"
//! shape, generalized from a fixed node graph to a tree that is re-rendered
//! fresh every frame.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::adapter::{Adapter, AdapterOptions, AdapterResult, StopReason};
use crate::debug::{DebugBus, DebugEvent, NodeSnapshot};
use crate::human::HumanCoordinator;
use crate::middleware::Pipeline;
use crate::review::{ReviewGate, ReviewRequest, TargetKind};
use crate::store::{Param, Store, StoreError};
use crate::tree::{content_hash, Node};

/// Why the engine loop stopped (spec §4.6 "Termination reasons").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    StopNode,
    ReviewRejected,
    MaxFrames,
    Timeout,
    EmptyTree,
    Cancelled,
}

/// State of a `human_interactions` row, as seen by the engine's human-check
/// step (spec §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HumanRowStatus {
    Absent,
    Pending,
    Resolved,
}

/// Result returned by [`ExecutionEngine::run`] (spec §7 "single result
/// object").
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub output: Option<String>,
    pub frames: u32,
    pub total_duration: Duration,
    pub reason: TerminationReason,
    pub error: Option<String>,
}

/// Per-run options (spec §4.6 option bag).
pub struct ExecutionOptions {
    pub max_frames: u32,
    pub timeout: Option<Duration>,
    pub mock_mode: bool,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub parallelism: usize,
    pub debug_include_tree_snapshots: bool,
    pub on_frame_update: Option<Arc<dyn Fn(&Node, u32) + Send + Sync>>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_frames: 100,
            timeout: None,
            mock_mode: false,
            model: None,
            max_tokens: None,
            parallelism: 4,
            debug_include_tree_snapshots: false,
            on_frame_update: None,
        }
    }
}

/// Produces the current tree for a frame. The render layer owns parsing; the
/// engine treats this as an opaque, possibly-failing async function (spec
/// §6 "Agent-file interface").
pub type RerenderFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<Node, String>> + Send>> + Send + Sync>;

/// Stable per-slot identity: a node's content hash scoped to its preorder
/// position, so two structurally-identical siblings don't collide and a
/// single node's identity survives across frames as long as its content
/// doesn't change materially (spec §4.6 step 6 "re-execution" semantics rely
/// on comparing a persisted hash against the current one).
fn slot_id(execution_id: &str, index: usize, hash: &str) -> String {
    format!("{execution_id}-{index}-{}", &hash[..16.min(hash.len())])
}

pub struct ExecutionEngine {
    store: Arc<Store>,
    execution_id: String,
    adapter: Arc<dyn Adapter>,
    pipeline: Arc<Pipeline>,
    human: HumanCoordinator,
    review: ReviewGate,
    debug: Arc<DebugBus>,
    cancel: CancellationToken,
    frame_counter: AtomicU64,
    last_output: Arc<std::sync::Mutex<Option<String>>>,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<Store>,
        execution_id: impl Into<String>,
        adapter: Arc<dyn Adapter>,
        pipeline: Arc<Pipeline>,
        debug: Arc<DebugBus>,
        cancel: CancellationToken,
    ) -> Self {
        let execution_id = execution_id.into();
        let human = HumanCoordinator::new(store.clone(), execution_id.clone());
        let review = ReviewGate::new(store.clone(), adapter.clone(), execution_id.clone());
        Self {
            store,
            execution_id,
            adapter,
            pipeline,
            human,
            review,
            debug,
            cancel,
            frame_counter: AtomicU64::new(0),
            last_output: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    pub async fn run(&self, rerender: RerenderFn, options: ExecutionOptions) -> ExecutionResult {
        let start = Instant::now();
        self.debug.emit(DebugEvent::SessionStart);

        let mut frame: u32 = 0;
        let result = loop {
            frame += 1;
            self.frame_counter.store(frame as u64, Ordering::SeqCst);

            if self.cancel.is_cancelled() {
                break self.terminate(TerminationReason::Cancelled, None, frame, start);
            }
            if frame > options.max_frames {
                break self.terminate(TerminationReason::MaxFrames, None, frame, start);
            }
            if let Some(timeout) = options.timeout {
                if start.elapsed() > timeout {
                    break self.terminate(TerminationReason::Timeout, None, frame, start);
                }
            }

            self.debug.emit(DebugEvent::FrameStart { frame });

            let tree = match rerender().await {
                Ok(tree) => tree,
                Err(message) => break self.terminate(TerminationReason::Cancelled, Some(message), frame, start),
            };

            if let Some(cb) = &options.on_frame_update {
                cb(&tree, frame);
            }
            if options.debug_include_tree_snapshots {
                self.debug.emit(DebugEvent::TreeUpdate {
                    tree: NodeSnapshot::from_node(&tree),
                });
            }

            // Step 3: stop check.
            if let Some(stop_node) = tree.preorder().find(|n| n.is_stop_marker()) {
                let reason = stop_node.prop_str("reason").map(str::to_string);
                self.debug.emit(DebugEvent::FrameEnd { frame });
                break self.terminate(TerminationReason::StopNode, reason, frame, start);
            }

            // Step 4: human check — suspend for the first unresolved human node.
            if let Some((index, human_node)) = tree
                .preorder()
                .enumerate()
                .find(|(_, n)| n.node_type.eq_ignore_ascii_case("human"))
            {
                let id = slot_id(&self.execution_id, index, &content_hash(human_node));
                match self.human_status(&id).await {
                    Ok(HumanRowStatus::Resolved) => {}
                    Ok(HumanRowStatus::Absent) => {
                        let prompt = human_node.prop_str("prompt").unwrap_or("").to_string();
                        let options_value = human_node.prop("options").cloned();
                        if self.human.ask(&id, &prompt, options_value).await.is_err() {
                            self.debug.emit(DebugEvent::FrameEnd { frame });
                            break self.terminate(TerminationReason::Cancelled, None, frame, start);
                        }
                        self.debug.emit(DebugEvent::FrameEnd { frame });
                        continue;
                    }
                    Ok(HumanRowStatus::Pending) => {
                        // A prior frame (or a resumed execution) already inserted this
                        // row; re-inserting would violate the id PRIMARY KEY. Resume
                        // waiting on the row instead.
                        if self.human.await_resolution(&id).await.is_err() {
                            self.debug.emit(DebugEvent::FrameEnd { frame });
                            break self.terminate(TerminationReason::Cancelled, None, frame, start);
                        }
                        self.debug.emit(DebugEvent::FrameEnd { frame });
                        continue;
                    }
                    Err(_) => {
                        self.debug.emit(DebugEvent::FrameEnd { frame });
                        break self.terminate(TerminationReason::Cancelled, None, frame, start);
                    }
                }
            }

            // Step 5: review gate.
            for (index, node) in tree.preorder().enumerate() {
                if !node.node_type.eq_ignore_ascii_case("review") {
                    continue;
                }
                let id = slot_id(&self.execution_id, index, &content_hash(node));
                if self.review_exists(&id).await.unwrap_or(false) {
                    continue;
                }
                let request = ReviewRequest {
                    target_kind: parse_target_kind(node.prop_str("target").unwrap_or("diff")),
                    target_ref: node.prop_str("targetRef").map(str::to_string),
                    content: node.prop_str("content").unwrap_or("").to_string(),
                    blocking: node.prop_bool("blocking").unwrap_or(true),
                    model: options.model.clone(),
                };
                let blocking = request.blocking;
                match self.review.run(&id, request).await {
                    Ok(verdict) if blocking && !verdict.approved => {
                        self.debug.emit(DebugEvent::FrameEnd { frame });
                        break self.terminate(
                            TerminationReason::ReviewRejected,
                            Some(verdict.summary),
                            frame,
                            start,
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.debug.emit(DebugEvent::FrameEnd { frame });
                        break self.terminate(TerminationReason::Cancelled, Some(e.to_string()), frame, start);
                    }
                }
            }

            // Step 6/7: find and dispatch executables.
            let pending = self.find_pending_executables(&tree).await;
            if pending.is_empty() {
                self.debug.emit(DebugEvent::FrameEnd { frame });
                break self.terminate(TerminationReason::EmptyTree, None, frame, start);
            }

            self.dispatch(pending, &options).await;
            self.debug.emit(DebugEvent::FrameEnd { frame });
        };

        self.debug.emit(DebugEvent::SessionEnd);
        result
    }

    fn terminate(
        &self,
        reason: TerminationReason,
        error: Option<String>,
        frame: u32,
        start: Instant,
    ) -> ExecutionResult {
        self.debug.emit(DebugEvent::LoopTerminated { reason });
        let output = self.last_output.lock().unwrap().clone();
        ExecutionResult {
            output,
            frames: frame,
            total_duration: start.elapsed(),
            reason,
            error,
        }
    }

    /// Distinguishes "no row yet" from "a row exists but is still pending" —
    /// conflating the two would re-`INSERT` against an existing primary key
    /// on a resumed execution (spec §4.7).
    async fn human_status(&self, id: &str) -> Result<HumanRowStatus, StoreError> {
        let row = self
            .store
            .query_one("SELECT status FROM human_interactions WHERE id = ?", vec![Param::from(id)])
            .await?;
        Ok(match row {
            None => HumanRowStatus::Absent,
            Some(row) if row.get("status").and_then(Value::as_str) == Some("pending") => {
                HumanRowStatus::Pending
            }
            Some(_) => HumanRowStatus::Resolved,
        })
    }

    async fn review_exists(&self, id: &str) -> Result<bool, StoreError> {
        let row = self
            .store
            .query_one("SELECT id FROM reviews WHERE id = ?", vec![Param::from(id)])
            .await?;
        Ok(row.is_some())
    }

    /// Preorder walk selecting executable nodes whose state is absent,
    /// pending, or stale against their persisted content hash (spec §4.6
    /// step 6).
    async fn find_pending_executables<'a>(&self, tree: &'a Node) -> Vec<(String, &'a Node, String)> {
        let mut out = Vec::new();
        for (index, node) in tree.preorder().enumerate() {
            if !node.is_executable() {
                continue;
            }
            let hash = content_hash(node);
            let id = slot_id(&self.execution_id, index, &hash);
            let row = self
                .store
                .query_one(
                    "SELECT status, content_hash FROM agents WHERE id = ?",
                    vec![Param::from(id.as_str())],
                )
                .await
                .ok()
                .flatten();
            let needs_dispatch = match row {
                None => true,
                Some(row) => {
                    let status = row.get("status").and_then(Value::as_str).unwrap_or("pending");
                    match status {
                        "pending" => true,
                        "complete" | "error" => {
                            row.get("content_hash").and_then(Value::as_str) != Some(hash.as_str())
                        }
                        _ => false,
                    }
                }
            };
            if needs_dispatch {
                out.push((id, node, hash));
            }
        }
        out
    }

    async fn dispatch(&self, pending: Vec<(String, &Node, String)>, options: &ExecutionOptions) {
        let semaphore = Arc::new(Semaphore::new(options.parallelism.max(1)));
        let mut set = tokio::task::JoinSet::new();

        for (id, node, hash) in pending {
            let _ = self
                .store
                .run(
                    "INSERT INTO agents (id, execution_id, node_key, model, prompt, status, content_hash, started_at) \
                     VALUES (?, ?, ?, ?, ?, 'running', ?, strftime('%s','now')) \
                     ON CONFLICT(id) DO UPDATE SET status = 'running', content_hash = excluded.content_hash, started_at = excluded.started_at",
                    vec![
                        Param::from(id.as_str()),
                        Param::from(self.execution_id.as_str()),
                        node.key.as_ref().map(|k| Param::from(k.to_string())).unwrap_or(Param::Null),
                        node.prop_str("model").map(Param::from).unwrap_or(Param::Null),
                        Param::from(node.prop_str("prompt").unwrap_or("").to_string()),
                        Param::from(hash.clone()),
                    ],
                )
                .await;

            let node_key = node.key.as_ref().map(|k| k.to_string()).unwrap_or_else(|| id.clone());
            self.debug.emit(DebugEvent::NodeExecuteStart {
                node_key: node_key.clone(),
                node_type: node.node_type.clone(),
            });

            let adapter_options = build_adapter_options(node, options, &hash);
            let adapter = self.adapter.clone();
            let pipeline = self.pipeline.clone();
            let store = self.store.clone();
            let execution_id = self.execution_id.clone();
            let cancel = self.cancel.clone();
            let permit = semaphore.clone().acquire_owned();
            let id_owned = id.clone();
            let node_type = node.node_type.clone();
            let debug = self.debug.clone();
            let last_output = self.last_output.clone();

            set.spawn(async move {
                let _permit = permit.await;
                let (tx, mut rx) = tokio::sync::mpsc::channel(64);
                let drain_pipeline = pipeline.clone();
                let drain_debug = debug.clone();
                let drain_node_key = node_key.clone();
                let drain = tokio::spawn(async move {
                    while let Some(chunk) = rx.recv().await {
                        let chunk = drain_pipeline.transform_chunk(chunk);
                        drain_debug.emit(DebugEvent::NodeChunk {
                            node_key: drain_node_key.clone(),
                            content: chunk.content,
                            is_final: chunk.is_final,
                        });
                    }
                });
                let cancel_for_adapter = cancel.clone();
                let result = pipeline
                    .run(adapter_options, move |opts| {
                        let adapter = adapter.clone();
                        let tx = tx.clone();
                        let cancel = cancel_for_adapter.clone();
                        Box::pin(async move { adapter.invoke(opts, tx, cancel).await })
                    })
                    .await;
                let _ = drain.await;
                if let Err(e) = persist_result(&store, &execution_id, &id_owned, &result).await {
                    tracing::warn!(id = %id_owned, error = %e, "failed to persist agent result");
                    debug.emit(DebugEvent::Log {
                        level: "warn".to_string(),
                        message: format!("failed to persist result for {id_owned}: {e}"),
                    });
                }
                if !result.output.is_empty() {
                    *last_output.lock().unwrap() = Some(result.output.clone());
                }
                debug.emit(DebugEvent::NodeExecuteEnd {
                    node_key,
                    node_type,
                    success: result.stop_reason == StopReason::Completed,
                });
                result
            });
        }

        while set.join_next().await.is_some() {}
    }
}

async fn persist_result(
    store: &Store,
    execution_id: &str,
    id: &str,
    result: &AdapterResult,
) -> Result<(), StoreError> {
    let status = match result.stop_reason {
        StopReason::Completed | StopReason::StopCondition => "complete",
        StopReason::Cancelled => "cancelled",
        StopReason::Error => "error",
    };
    store
        .run(
            "UPDATE agents SET status = ?, result = ?, result_structured = ?, error = ?, \
             tokens_in = ?, tokens_out = ?, completed_at = strftime('%s','now') WHERE id = ?",
            vec![
                Param::from(status),
                Param::from(result.output.clone()),
                result
                    .structured
                    .as_ref()
                    .map(|v| Param::from(v.to_string()))
                    .unwrap_or(Param::Null),
                if status == "error" {
                    Param::from(result.output.clone())
                } else {
                    Param::Null
                },
                Param::Int(result.tokens_used.input as i64),
                Param::Int(result.tokens_used.output as i64),
                Param::from(id),
            ],
        )
        .await?;
    let level = if status == "error" { "warn" } else { "info" };
    store
        .run(
            "INSERT INTO reports (id, execution_id, agent_id, level, message, created_at) \
             VALUES (?, ?, ?, ?, ?, strftime('%s','now'))",
            vec![
                Param::from(format!("{id}-report")),
                Param::from(execution_id),
                Param::from(id),
                Param::from(level),
                Param::from(result.output.chars().take(500).collect::<String>()),
            ],
        )
        .await?;
    Ok(())
}

fn build_adapter_options(node: &Node, options: &ExecutionOptions, hash: &str) -> AdapterOptions {
    let prompt = node.prop_str("prompt").unwrap_or("").to_string();
    let mut adapter_options = AdapterOptions::new(prompt);
    adapter_options.model = node
        .prop_str("model")
        .map(str::to_string)
        .or_else(|| options.model.clone());
    adapter_options.max_tokens = node
        .prop("maxTokens")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .or(options.max_tokens);
    adapter_options.system_prompt = node.prop_str("systemPrompt").map(str::to_string);
    adapter_options.timeout = node.prop("timeout").and_then(Value::as_i64);
    adapter_options.extra = json!({ "content_hash": hash, "mock_mode": options.mock_mode });
    adapter_options
}

fn parse_target_kind(s: &str) -> TargetKind {
    match s {
        "commit" => TargetKind::Commit,
        "pr" => TargetKind::Pr,
        "files" => TargetKind::Files,
        _ => TargetKind::Diff,
    }
}
