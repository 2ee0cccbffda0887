//! Store error type, grounded on the teacher's `memory::store::StoreError`
//! shape (`Storage(String)` wrapping the underlying engine's message, per
//! spec §7 "StoreError — database failures").

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("store is closed")]
    Closed,

    #[error("invalid row filter: {0}")]
    InvalidRowFilter(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}
