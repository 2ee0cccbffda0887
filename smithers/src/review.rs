//! Review gate (spec §4.8): sends a diff/PR/file bundle to an adapter for a
//! structured approve/reject verdict and persists the outcome.
//!
//! Grounded on [`crate::adapter::AdapterOptions::schema`] and the
//! extract-then-retry loop in `adapter::process::ProcessAdapter` for the
//! structured-output contract.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::adapter::{Adapter, AdapterOptions};
use crate::store::{Param, Store, StoreError};

/// Content above this size is truncated, keeping the head and tail and
/// dropping the middle (spec §4.8 "~120 KiB").
pub const TRUNCATE_THRESHOLD_BYTES: usize = 120 * 1024;
const HEAD_KEEP_BYTES: usize = 48 * 1024;
const TAIL_KEEP_BYTES: usize = 48 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Commit,
    Diff,
    Pr,
    Files,
}

impl TargetKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Diff => "diff",
            Self::Pr => "pr",
            Self::Files => "files",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub severity: IssueSeverity,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    Major,
    Minor,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
}

fn review_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["approved", "summary"],
        "properties": {
            "approved": {"type": "boolean"},
            "summary": {"type": "string"},
            "issues": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["severity", "message"],
                    "properties": {
                        "severity": {"enum": ["critical", "major", "minor"]},
                        "file": {"type": "string"},
                        "line": {"type": "integer"},
                        "message": {"type": "string"},
                        "suggestion": {"type": "string"}
                    }
                }
            }
        }
    })
}

/// Keeps the head and tail of `content`, dropping the middle, once it
/// exceeds [`TRUNCATE_THRESHOLD_BYTES`].
pub fn truncate_for_review(content: &str) -> String {
    if content.len() <= TRUNCATE_THRESHOLD_BYTES {
        return content.to_string();
    }
    let head = take_char_boundary(content, HEAD_KEEP_BYTES);
    let tail_start = content.len().saturating_sub(TAIL_KEEP_BYTES);
    let tail_start = content
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= tail_start)
        .unwrap_or(content.len());
    let tail = &content[tail_start..];
    format!(
        "{head}\n\n... [{} bytes truncated] ...\n\n{tail}",
        content.len() - head.len() - tail.len()
    )
}

fn take_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub struct ReviewRequest {
    pub target_kind: TargetKind,
    pub target_ref: Option<String>,
    pub content: String,
    pub blocking: bool,
    pub model: Option<String>,
}

pub struct ReviewGate {
    store: Arc<Store>,
    adapter: Arc<dyn Adapter>,
    execution_id: String,
    schema_retries: u32,
}

impl ReviewGate {
    pub fn new(store: Arc<Store>, adapter: Arc<dyn Adapter>, execution_id: impl Into<String>) -> Self {
        Self {
            store,
            adapter,
            execution_id: execution_id.into(),
            schema_retries: 2,
        }
    }

    /// Runs one review: builds the prompt, invokes the adapter for a
    /// structured verdict, persists a `reviews` row, and returns it.
    pub async fn run(&self, id: &str, request: ReviewRequest) -> Result<ReviewVerdict, StoreError> {
        let prompt = self.build_prompt(&request);
        let options = AdapterOptions {
            model: request.model.clone(),
            schema: Some(review_schema()),
            schema_retries: self.schema_retries,
            ..AdapterOptions::new(prompt)
        };
        let (tx, _rx) = tokio::sync::mpsc::channel(32);
        let result = self.adapter.invoke(options, tx, CancellationToken::new()).await;

        let verdict = result
            .structured
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(ReviewVerdict {
                approved: false,
                summary: format!("review adapter did not return a structured verdict: {}", result.output),
                issues: Vec::new(),
            });

        self.persist(id, &request, &verdict).await?;
        Ok(verdict)
    }

    fn build_prompt(&self, request: &ReviewRequest) -> String {
        let truncated = truncate_for_review(&request.content);
        format!(
            "Review the following {} and respond with JSON matching {{approved, summary, issues}}.\n\n{}",
            request.target_kind.as_str(),
            truncated
        )
    }

    async fn persist(
        &self,
        id: &str,
        request: &ReviewRequest,
        verdict: &ReviewVerdict,
    ) -> Result<(), StoreError> {
        self.store
            .run(
                "INSERT INTO reviews (id, execution_id, target_kind, target_ref, blocking, approved, summary, issues, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, strftime('%s','now'))",
                vec![
                    Param::from(id),
                    Param::from(self.execution_id.as_str()),
                    Param::from(request.target_kind.as_str()),
                    request
                        .target_ref
                        .clone()
                        .map(Param::from)
                        .unwrap_or(Param::Null),
                    Param::from(request.blocking as i64),
                    Param::from(verdict.approved as i64),
                    Param::from(verdict.summary.clone()),
                    Param::from(serde_json::to_string(&verdict.issues).unwrap_or_default()),
                ],
            )
            .await?;
        Ok(())
    }
}

/// `true` when a blocking review's verdict should terminate the engine loop.
pub fn should_block(request: &ReviewRequest, verdict: &ReviewVerdict) -> bool {
    request.blocking && !verdict.approved
}
