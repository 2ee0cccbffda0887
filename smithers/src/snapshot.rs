//! Tool-call snapshot wrapper (spec §4.9, optional).
//!
//! Classifies each tool call by name into read-only or write. Write-classified
//! calls are wrapped with a before/after VCS snapshot so a failed call can be
//! rolled back; read-only calls pass through untouched. Grounded on
//! `adapter::process::ProcessAdapter` for the `tokio::process::Command` spawn
//! style, generalized from "run one CLI backend" to "run one short-lived git
//! subcommand and capture its stdout".

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use uuid::Uuid;

use crate::store::{Param, Row, Store, StoreError};

/// Tool names the engine treats as read-only: never snapshotted.
pub const READ_ONLY_TOOLS: &[&str] = &[
    "Read",
    "Glob",
    "Grep",
    "WebFetch",
    "WebSearch",
    "TaskOutput",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolCallClass {
    ReadOnly,
    Write,
}

/// Classifies a tool call by name. Unknown names default to `Write`: a tool
/// the classifier doesn't recognise is assumed capable of touching the
/// working tree.
pub fn classify_tool_call(tool_name: &str) -> ToolCallClass {
    if READ_ONLY_TOOLS.contains(&tool_name) {
        ToolCallClass::ReadOnly
    } else {
        ToolCallClass::Write
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotPhase {
    Before,
    After,
}

impl SnapshotPhase {
    fn as_str(self) -> &'static str {
        match self {
            SnapshotPhase::Before => "before",
            SnapshotPhase::After => "after",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },
    #[error("{binary} exited with {status}: {stderr}")]
    CommandFailed {
        binary: String,
        status: String,
        stderr: String,
    },
}

/// Snapshot of the working tree at a point in time: the VCS revision id and
/// the set of files `git status --porcelain` reports as modified.
#[derive(Clone, Debug, Default)]
pub struct VcsState {
    pub change_id: Option<String>,
    pub modified_files: Vec<String>,
    pub bookmark: Option<String>,
}

/// Thin wrapper over the `git` binary: takes before/after states and can
/// roll the working tree back to a previously observed revision.
pub struct VcsSnapshotter {
    repo_root: PathBuf,
}

impl VcsSnapshotter {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<String, SnapshotError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SnapshotError::Spawn {
                binary: "git".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(SnapshotError::CommandFailed {
                binary: "git".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Captures the current revision and the list of modified files. A
    /// non-repo `repo_root` (git exits nonzero) yields an empty state rather
    /// than an error: snapshotting is best-effort scaffolding, not a hard
    /// dependency of the engine loop.
    pub async fn snapshot(&self) -> VcsState {
        let change_id = self.run_git(&["rev-parse", "HEAD"]).await.ok();
        let bookmark = self
            .run_git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .ok()
            .filter(|b| b != "HEAD");
        let modified_files = self
            .run_git(&["status", "--porcelain"])
            .await
            .map(|out| {
                out.lines()
                    .filter_map(|line| line.get(3..).map(|s| s.trim().to_string()))
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        VcsState {
            change_id,
            modified_files,
            bookmark,
        }
    }

    /// Discards uncommitted changes and resets to `change_id`. Used to roll
    /// back a write-classified tool call that failed partway through.
    pub async fn rollback_to(&self, change_id: &str) -> Result<(), SnapshotError> {
        self.run_git(&["reset", "--hard", change_id]).await?;
        self.run_git(&["clean", "-fd"]).await?;
        Ok(())
    }
}

async fn persist_snapshot(
    store: &Store,
    execution_id: &str,
    tool_call_id: Option<&str>,
    state: &VcsState,
    phase: SnapshotPhase,
) -> Result<String, StoreError> {
    let id = Uuid::new_v4().to_string();
    let modified_files = serde_json::to_string(&state.modified_files).unwrap_or_default();
    let now = now_ms();
    store
        .run(
            "INSERT INTO snapshots \
             (id, execution_id, tool_call_id, change_id, modified_files, bookmark, phase, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                Param::from(id.as_str()),
                Param::from(execution_id),
                tool_call_id
                    .map(Param::from)
                    .unwrap_or(Param::Null),
                state
                    .change_id
                    .as_deref()
                    .map(Param::from)
                    .unwrap_or(Param::Null),
                Param::from(modified_files.as_str()),
                state
                    .bookmark
                    .as_deref()
                    .map(Param::from)
                    .unwrap_or(Param::Null),
                Param::from(phase.as_str()),
                Param::Int(now),
            ],
        )
        .await?;
    Ok(id)
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Wraps a single tool call with before/after snapshotting. Read-only calls
/// run `f` directly. Write calls snapshot before, run `f`, snapshot after on
/// success, and roll back to the "before" state on failure.
///
/// `f`'s `Err` is always propagated to the caller (as `Ok(Err(e))`) after the
/// rollback attempt; a rollback failure is folded into a `SnapshotError` so
/// the caller can tell "the tool failed" from "the tool failed and the
/// working tree may be dirty".
pub async fn guard_tool_call<F, Fut, T, E>(
    store: &Store,
    snapshotter: &VcsSnapshotter,
    execution_id: &str,
    tool_call_id: &str,
    tool_name: &str,
    f: F,
) -> Result<Result<T, E>, SnapshotError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    if classify_tool_call(tool_name) == ToolCallClass::ReadOnly {
        return Ok(f().await);
    }

    let before = snapshotter.snapshot().await;
    persist_snapshot(
        store,
        execution_id,
        Some(tool_call_id),
        &before,
        SnapshotPhase::Before,
    )
    .await?;

    match f().await {
        Ok(value) => {
            let after = snapshotter.snapshot().await;
            persist_snapshot(
                store,
                execution_id,
                Some(tool_call_id),
                &after,
                SnapshotPhase::After,
            )
            .await?;
            Ok(Ok(value))
        }
        Err(err) => {
            if let Some(change_id) = &before.change_id {
                snapshotter.rollback_to(change_id).await?;
            }
            Ok(Err(err))
        }
    }
}

/// Deletes snapshot rows for `execution_id` beyond the newest `keep_count`,
/// and any row older than `max_age`. Returns the number of rows pruned.
pub async fn prune_snapshots(
    store: &Store,
    execution_id: &str,
    keep_count: usize,
    max_age: Duration,
) -> Result<usize, StoreError> {
    let cutoff = now_ms() - max_age.as_millis() as i64;
    let rows: Vec<Row> = store
        .query(
            "SELECT id FROM snapshots WHERE execution_id = ? ORDER BY created_at DESC",
            vec![Param::from(execution_id)],
        )
        .await?;

    let mut stale_ids: Vec<String> = rows
        .iter()
        .skip(keep_count)
        .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
        .collect();

    let aged: Vec<Row> = store
        .query(
            "SELECT id FROM snapshots WHERE execution_id = ? AND created_at < ?",
            vec![Param::from(execution_id), Param::Int(cutoff)],
        )
        .await?;
    for r in aged {
        if let Some(id) = r.get("id").and_then(Value::as_str) {
            if !stale_ids.iter().any(|s| s == id) {
                stale_ids.push(id.to_string());
            }
        }
    }

    let pruned = stale_ids.len();
    for id in stale_ids {
        store
            .run("DELETE FROM snapshots WHERE id = ?", vec![Param::from(id.as_str())])
            .await?;
    }
    Ok(pruned)
}
