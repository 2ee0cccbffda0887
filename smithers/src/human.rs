//! Human-interaction coordinator (spec §4.7).
//!
//! `ask` writes a `human_interactions` row and awaits its `status` leaving
//! `pending` via the store's reactive row-filter subscription, the same
//! wait-for-row-change shape the engine's own human-node gate uses.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Notify;

use crate::store::{Param, Store, StoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HumanStatus {
    Approved,
    Rejected,
    Resolved,
}

impl HumanStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// Outcome of a resolved `ask`. `response` is the decoded JSON `response`
/// column when parseable, otherwise the raw text wrapped in a JSON string.
#[derive(Clone, Debug)]
pub struct HumanAnswer {
    pub status: HumanStatus,
    pub response: Value,
}

pub struct HumanCoordinator {
    store: Arc<Store>,
    execution_id: String,
}

impl HumanCoordinator {
    pub fn new(store: Arc<Store>, execution_id: impl Into<String>) -> Self {
        Self {
            store,
            execution_id: execution_id.into(),
        }
    }

    /// Inserts a `pending` row and blocks until it's approved, rejected, or
    /// resolved. Returns `Err(StoreError::Closed)` if the store is closed
    /// while waiting — the caller treats this the same as cancellation.
    pub async fn ask(&self, id: &str, prompt: &str, options: Option<Value>) -> Result<HumanAnswer, StoreError> {
        self.store
            .run(
                "INSERT INTO human_interactions (id, execution_id, prompt, options, status, created_at) \
                 VALUES (?, ?, ?, ?, 'pending', strftime('%s','now'))",
                vec![
                    Param::from(id),
                    Param::from(self.execution_id.as_str()),
                    Param::from(prompt),
                    Param::from(options.map(|v| v.to_string()).unwrap_or_default()),
                ],
            )
            .await?;

        self.await_resolution(id).await
    }

    /// Waits for a row already inserted elsewhere (e.g. the engine's human
    /// gate, which writes the row itself before delegating here).
    pub async fn await_resolution(&self, id: &str) -> Result<HumanAnswer, StoreError> {
        let notify = Arc::new(Notify::new());
        let n2 = notify.clone();
        let sub = self
            .store
            .subscribe_with_row_filter("human_interactions", "id", id, move || {
                n2.notify_one();
            });

        let result = loop {
            if self.store.is_closed() {
                break Err(StoreError::Closed);
            }
            let row = self
                .store
                .query_one(
                    "SELECT status, response FROM human_interactions WHERE id = ?",
                    vec![Param::from(id)],
                )
                .await?;
            if let Some(row) = row {
                let status_text = row.get("status").and_then(Value::as_str).unwrap_or("pending");
                if let Some(status) = HumanStatus::parse(status_text) {
                    let response = row
                        .get("response")
                        .and_then(Value::as_str)
                        .map(|s| serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())))
                        .unwrap_or(Value::Null);
                    break Ok(HumanAnswer { status, response });
                }
            }
            notify.notified().await;
        };

        self.store.unsubscribe(sub);
        result
    }

    /// Marks every still-pending interaction `cancelled` (spec §4.7:
    /// "cancelling the engine completes all outstanding asks with
    /// `cancelled`"). Subscribers awaiting `await_resolution` on those rows
    /// will see the unhandled status and the caller is expected to treat the
    /// engine-level cancellation signal as authoritative instead.
    pub async fn cancel_all_pending(&self) -> Result<(), StoreError> {
        self.store
            .run(
                "UPDATE human_interactions SET status = 'cancelled' WHERE status = 'pending'",
                vec![],
            )
            .await?;
        Ok(())
    }
}
