//! Agent adapter: one interface per CLI backend (spec §4.5).
//!
//! Grounded on the teacher's `llm::LlmClient` trait shape (`invoke` /
//! `invoke_stream` taking an `mpsc::Sender` progress channel) generalized
//! from "talk to an HTTP LLM API" to "talk to a spawned CLI process", and on
//! `cli/src/backend/auto_start.rs` for the `tokio::process`/`Stdio` idioms.

pub mod mock;
pub mod process;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use mock::MockAdapter;
pub use process::ProcessAdapter;

/// Options resolved for a single adapter invocation (spec §4.5, §6 "Adapter
/// interface"). Unknown/unused fields are accepted by construction and
/// simply ignored by adapters that don't need them.
#[derive(Clone, Debug, Default)]
pub struct AdapterOptions {
    pub prompt: String,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub tools: Vec<String>,
    pub cwd: Option<std::path::PathBuf>,
    /// Total time budget for this invocation, in milliseconds. `None` means
    /// no adapter-level timeout is applied (an outer engine/middleware
    /// timeout may still apply). Signed so that `Some(0)` and negative
    /// sentinel values round-trip verbatim (spec §8) — `Duration` can't
    /// represent a negative value, so adapters treat any `ms <= 0` as "don't
    /// enforce" while still preserving the stored number.
    pub timeout: Option<i64>,
    pub schema: Option<Value>,
    pub schema_retries: u32,
    pub json: bool,
    pub extra: Value,
}

impl AdapterOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            schema_retries: 0,
            extra: Value::Null,
            ..Default::default()
        }
    }
}

/// One streamed chunk from an in-flight adapter invocation.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub content: String,
    pub is_final: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokensUsed {
    pub input: u32,
    pub output: u32,
}

/// Outcome of one adapter invocation (spec §4.5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    StopCondition,
    Cancelled,
    Error,
}

#[derive(Clone, Debug)]
pub struct AdapterResult {
    pub output: String,
    pub structured: Option<Value>,
    pub tokens_used: TokensUsed,
    pub turns_used: u32,
    pub duration_ms: u64,
    pub stop_reason: StopReason,
}

impl AdapterResult {
    pub fn error(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            output: message.into(),
            structured: None,
            tokens_used: TokensUsed::default(),
            turns_used: 0,
            duration_ms,
            stop_reason: StopReason::Error,
        }
    }

    pub fn cancelled(partial_output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            output: partial_output.into(),
            structured: None,
            tokens_used: TokensUsed::default(),
            turns_used: 0,
            duration_ms,
            stop_reason: StopReason::Cancelled,
        }
    }
}

/// Progress sink passed into an adapter invocation. Replaces the source's
/// `onProgress` callback (spec §9 "Callbacks... replace with result channels
/// and a Progress sink").
pub type ProgressSender = mpsc::Sender<Chunk>;

/// One interface per CLI backend (spec §4.5). Implementors launch a child
/// process (or, for [`MockAdapter`], simulate one), stream output through
/// `progress`, enforce `options.timeout`, and honour `cancel`.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable name used in `agents.model`/log messages and middleware keys.
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        options: AdapterOptions,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> AdapterResult;
}

/// Extracts a JSON object from an adapter's final chunk: prefers a
/// ```json ... ``` fenced block, falls back to the first `{...}` span.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(start) = text.find("```json") {
        let after = &text[start + "```json".len()..];
        if let Some(end) = after.find("```") {
            if let Ok(v) = serde_json::from_str(after[..end].trim()) {
                return Some(v);
            }
        }
    }
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    if last < first {
        return None;
    }
    serde_json::from_str(&text[first..=last]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_prefers_fenced_block() {
        let text = "here you go\n```json\n{\"a\":1}\n```\ntrailing {\"b\":2}";
        assert_eq!(extract_json(text), Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn extract_json_falls_back_to_raw_braces() {
        let text = "result: {\"a\":1} done";
        assert_eq!(extract_json(text), Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn extract_json_returns_none_when_absent() {
        assert_eq!(extract_json("no json here"), None);
    }
}
