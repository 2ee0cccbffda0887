//! Mock adapter (spec: supplemented `--mock` flag).
//!
//! Grounded on the teacher's `llm::StubLlm` test double (`llm/mod.rs`): a
//! deterministic, configurable stand-in used so end-to-end flows can be
//! exercised without spawning real child processes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Adapter, AdapterOptions, AdapterResult, Chunk, ProgressSender, StopReason, TokensUsed};

/// A scripted response, or a generator closure for programmatic mocks.
pub enum MockResponse {
    Text(String),
    Structured(serde_json::Value),
    Error(String),
}

/// Deterministic stand-in for a real CLI backend. Returns canned responses
/// in order; repeats the last one once exhausted. Used by `smithers --mock`
/// and by the engine's own tests.
pub struct MockAdapter {
    name: String,
    responses: Mutex<Vec<MockResponse>>,
    next: AtomicUsize,
    pub invocation_count: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>, responses: Vec<MockResponse>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(responses),
            next: AtomicUsize::new(0),
            invocation_count: AtomicUsize::new(0),
        }
    }

    /// A mock that always echoes back a fixed string.
    pub fn echo(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, vec![MockResponse::Text(text.into())])
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        options: AdapterOptions,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> AdapterResult {
        self.invocation_count.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return AdapterResult::cancelled("", 0);
        }

        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock().unwrap();
        let response = responses
            .get(idx)
            .or_else(|| responses.last())
            .map(|r| match r {
                MockResponse::Text(t) => MockResponse::Text(t.clone()),
                MockResponse::Structured(v) => MockResponse::Structured(v.clone()),
                MockResponse::Error(e) => MockResponse::Error(e.clone()),
            })
            .unwrap_or_else(|| MockResponse::Text(format!("mock reply to: {}", options.prompt)));
        drop(responses);

        match response {
            MockResponse::Text(text) => {
                let _ = progress
                    .send(Chunk {
                        content: text.clone(),
                        is_final: true,
                    })
                    .await;
                AdapterResult {
                    output: text,
                    structured: None,
                    tokens_used: TokensUsed { input: 1, output: 1 },
                    turns_used: 1,
                    duration_ms: 0,
                    stop_reason: StopReason::Completed,
                }
            }
            MockResponse::Structured(value) => {
                let text = value.to_string();
                let _ = progress
                    .send(Chunk {
                        content: text.clone(),
                        is_final: true,
                    })
                    .await;
                AdapterResult {
                    output: text,
                    structured: Some(value),
                    tokens_used: TokensUsed { input: 1, output: 1 },
                    turns_used: 1,
                    duration_ms: 0,
                    stop_reason: StopReason::Completed,
                }
            }
            MockResponse::Error(message) => AdapterResult::error(message, 0),
        }
    }
}
