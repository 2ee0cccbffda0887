//! Crate-wide error type for the execution engine and its collaborators.
//!
//! Each collaborator (store, adapter, middleware) defines its own narrow
//! error enum and `From`-converts into [`SmithersError`] at the boundary,
//! matching the teacher's per-module error style (`CompilationError`,
//! `StoreError`, `ChannelError`).

use thiserror::Error;

use crate::engine::TerminationReason;
use crate::store::StoreError;

/// Top-level error for engine, store, adapter, and middleware operations.
#[derive(Error, Debug)]
pub enum SmithersError {
    /// Bad CLI flag, bad config, unsupported file extension. Never retried.
    #[error("usage error: {0}")]
    Usage(String),

    /// Failure to parse/evaluate the agent file supplied by the host render layer.
    #[error("load error: {message}")]
    Load {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },

    /// Database failure. Transactions roll back; callers decide whether to retry.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Child process failed, crashed, or timed out.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Structured output failed its schema after exhausting retries.
    #[error("validation error: {0}")]
    Validation(String),

    /// A blocking review said `approved=false`.
    #[error("review rejected: {summary}")]
    ReviewRejection { summary: String },

    /// External cancellation signal.
    #[error("cancelled")]
    Cancelled,

    /// `maxFrames` or `timeout` exhausted.
    #[error("budget exhausted: {reason:?}")]
    BudgetExhausted { reason: TerminationReason },
}

impl SmithersError {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn load_at(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self::Load {
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }
}
