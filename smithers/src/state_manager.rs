//! State manager: KV façade over the `state` table plus an append-only
//! `transitions` audit log, with time-travel via [`StateManager::replay_to`]
//! (spec §4.2).
//!
//! Grounded on the teacher's `memory::sqlite_store::SqliteStore` for the
//! spawn_blocking-per-op / JSON-text-column style, generalized here to run
//! through [`crate::store::Store`] so every `set` also benefits from the
//! reactive invalidation layer.

use serde_json::Value;
use uuid::Uuid;

use crate::store::{Param, Row, Store, StoreError};

/// One row of the `transitions` audit log (spec §3 "transitions").
#[derive(Clone, Debug)]
pub struct Transition {
    pub id: String,
    pub execution_id: Option<String>,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub trigger: Option<String>,
    pub trigger_agent_id: Option<String>,
    pub created_at: i64,
}

fn transition_from_row(row: Row) -> Transition {
    Transition {
        id: text(&row, "id"),
        execution_id: opt_text(&row, "execution_id"),
        key: text(&row, "key"),
        old_value: opt_json(&row, "old_value"),
        new_value: opt_json(&row, "new_value"),
        trigger: opt_text(&row, "trigger"),
        trigger_agent_id: opt_text(&row, "trigger_agent_id"),
        created_at: row.get("created_at").and_then(Value::as_i64).unwrap_or(0),
    }
}

fn text(row: &Row, key: &str) -> String {
    row.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn opt_text(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

fn opt_json(row: &Row, key: &str) -> Option<Value> {
    match row.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => serde_json::from_str(s).ok(),
        Some(other) => Some(other.clone()),
    }
}

/// KV state manager scoped to a single execution (spec §4.2).
///
/// `execution_id` is `None` for engine-level state shared across runs
/// (`memories`-style use); most callers bind it to the current execution so
/// every transition is attributable.
pub struct StateManager {
    store: std::sync::Arc<Store>,
    execution_id: Option<String>,
}

impl StateManager {
    pub fn new(store: std::sync::Arc<Store>, execution_id: Option<String>) -> Self {
        Self { store, execution_id }
    }

    fn now_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let value = self
            .store
            .query_value("SELECT value FROM state WHERE key = ?", vec![Param::from(key)])
            .await?;
        Ok(match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(serde_json::from_str(&s).unwrap_or(Value::String(s))),
            Some(other) => Some(other),
        })
    }

    /// Writes `key = value`, recording a `transitions` row tagged with the
    /// bound execution id, an optional `trigger`, and `trigger_agent_id`.
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        trigger: Option<&str>,
        trigger_agent_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let old = self.get(key).await?;
        let now = self.now_ms();
        let encoded = serde_json::to_string(&value)?;
        let old_encoded = old.as_ref().map(|v| serde_json::to_string(v)).transpose()?;

        self.store
            .transaction(vec![
                (
                    "INSERT INTO state (key, value, updated_at) VALUES (?, ?, ?) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"
                        .into(),
                    vec![Param::from(key), Param::from(encoded.clone()), Param::from(now)],
                ),
                (
                    "INSERT INTO transitions (id, execution_id, key, old_value, new_value, trigger, trigger_agent_id, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
                        .into(),
                    vec![
                        Param::from(Uuid::new_v4().to_string()),
                        self.execution_id.clone().map(Param::from).unwrap_or(Param::Null),
                        Param::from(key),
                        old_encoded.map(Param::from).unwrap_or(Param::Null),
                        Param::from(encoded),
                        trigger.map(Param::from).unwrap_or(Param::Null),
                        trigger_agent_id.map(Param::from).unwrap_or(Param::Null),
                        Param::from(now),
                    ],
                ),
            ])
            .await
    }

    /// Writes every entry in `entries` as a single transaction (spec §4.2
    /// "`setMany` is a single transaction").
    pub async fn set_many(
        &self,
        entries: Vec<(String, Value)>,
        trigger: Option<&str>,
        trigger_agent_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = self.now_ms();
        let mut statements = Vec::with_capacity(entries.len() * 2);
        for (key, value) in entries {
            let old = self.get(&key).await?;
            let encoded = serde_json::to_string(&value)?;
            let old_encoded = old.as_ref().map(|v| serde_json::to_string(v)).transpose()?;
            statements.push((
                "INSERT INTO state (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"
                    .into(),
                vec![Param::from(key.clone()), Param::from(encoded.clone()), Param::from(now)],
            ));
            statements.push((
                "INSERT INTO transitions (id, execution_id, key, old_value, new_value, trigger, trigger_agent_id, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
                    .into(),
                vec![
                    Param::from(Uuid::new_v4().to_string()),
                    self.execution_id.clone().map(Param::from).unwrap_or(Param::Null),
                    Param::from(key),
                    old_encoded.map(Param::from).unwrap_or(Param::Null),
                    Param::from(encoded),
                    trigger.map(Param::from).unwrap_or(Param::Null),
                    trigger_agent_id.map(Param::from).unwrap_or(Param::Null),
                    Param::from(now),
                ],
            ));
        }
        self.store.transaction(statements).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store
            .exec("DELETE FROM state WHERE key = ?", vec![Param::from(key)])
            .await
    }

    pub async fn get_all(&self) -> Result<Vec<(String, Value)>, StoreError> {
        let rows = self.store.query("SELECT key, value FROM state", vec![]).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let key = text(&row, "key");
                let value = opt_json(&row, "value").unwrap_or(Value::Null);
                (key, value)
            })
            .collect())
    }

    /// Clears all state and reinstalls the defaults `phase="initial",
    /// iteration=0, data=null` (spec §4.2).
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.exec("DELETE FROM state", vec![]).await?;
        self.set("phase", Value::String("initial".into()), Some("reset"), None)
            .await?;
        self.set("iteration", Value::from(0), Some("reset"), None).await?;
        self.set("data", Value::Null, Some("reset"), None).await?;
        Ok(())
    }

    /// Transitions ordered by time descending, optionally filtered by key.
    pub async fn history(&self, key: Option<&str>, limit: i64) -> Result<Vec<Transition>, StoreError> {
        let rows = match key {
            Some(key) => {
                self.store
                    .query(
                        "SELECT * FROM transitions WHERE key = ? ORDER BY created_at DESC LIMIT ?",
                        vec![Param::from(key), Param::from(limit)],
                    )
                    .await?
            }
            None => {
                self.store
                    .query(
                        "SELECT * FROM transitions ORDER BY created_at DESC LIMIT ?",
                        vec![Param::from(limit)],
                    )
                    .await?
            }
        };
        Ok(rows.into_iter().map(transition_from_row).collect())
    }

    /// Snapshot of the full `state` table, for `restore`.
    pub async fn snapshot(&self) -> Result<Vec<(String, Value)>, StoreError> {
        self.get_all().await
    }

    pub async fn restore(&self, snapshot: Vec<(String, Value)>) -> Result<(), StoreError> {
        self.store.exec("DELETE FROM state", vec![]).await?;
        if !snapshot.is_empty() {
            self.set_many(snapshot, Some("restore"), None).await?;
        }
        Ok(())
    }

    /// Rewinds state by clearing it and re-applying every transition row up
    /// to and including `transition_id`, in ascending `created_at` order —
    /// deterministic time-travel (spec §4.2).
    pub async fn replay_to(&self, transition_id: &str) -> Result<(), StoreError> {
        let all = self
            .store
            .query("SELECT * FROM transitions ORDER BY created_at ASC", vec![])
            .await?;
        self.store.exec("DELETE FROM state", vec![]).await?;

        let now = self.now_ms();
        let mut statements = Vec::new();
        let mut found = false;
        for row in all {
            let t = transition_from_row(row);
            let encoded = t
                .new_value
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?
                .unwrap_or_else(|| "null".to_string());
            statements.push((
                "INSERT INTO state (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"
                    .into(),
                vec![Param::from(t.key.clone()), Param::from(encoded), Param::from(now)],
            ));
            if t.id == transition_id {
                found = true;
                break;
            }
        }
        if !statements.is_empty() {
            self.store.transaction(statements).await?;
        }
        if !found {
            return Err(StoreError::Storage(format!(
                "no transition with id {transition_id}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_manager() -> (StateManager, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(Store::open(dir.path().join("s.db")).unwrap());
        (StateManager::new(store, Some("exec-1".into())), dir)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (mgr, _dir) = temp_manager();
        mgr.set("phase", Value::String("second".into()), None, None)
            .await
            .unwrap();
        assert_eq!(mgr.get("phase").await.unwrap(), Some(Value::String("second".into())));
    }

    #[tokio::test]
    async fn set_many_is_a_single_transaction() {
        let (mgr, _dir) = temp_manager();
        mgr.set_many(
            vec![("a".into(), Value::from(1)), ("b".into(), Value::from(2))],
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(mgr.get("a").await.unwrap(), Some(Value::from(1)));
        assert_eq!(mgr.get("b").await.unwrap(), Some(Value::from(2)));
    }

    #[tokio::test]
    async fn reset_reinstalls_defaults() {
        let (mgr, _dir) = temp_manager();
        mgr.set("phase", Value::String("second".into()), None, None)
            .await
            .unwrap();
        mgr.reset().await.unwrap();
        assert_eq!(mgr.get("phase").await.unwrap(), Some(Value::String("initial".into())));
        assert_eq!(mgr.get("iteration").await.unwrap(), Some(Value::from(0)));
        assert_eq!(mgr.get("data").await.unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn snapshot_restore_round_trips_observable_state() {
        let (mgr, _dir) = temp_manager();
        mgr.set("a", Value::from(1), None, None).await.unwrap();
        let snap = mgr.snapshot().await.unwrap();
        mgr.set("a", Value::from(2), None, None).await.unwrap();
        mgr.set("b", Value::from(3), None, None).await.unwrap();
        mgr.restore(snap).await.unwrap();
        assert_eq!(mgr.get("a").await.unwrap(), Some(Value::from(1)));
        assert_eq!(mgr.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn transitions_are_monotone_and_chain_old_to_new() {
        let (mgr, _dir) = temp_manager();
        mgr.set("k", Value::from(1), None, None).await.unwrap();
        mgr.set("k", Value::from(2), None, None).await.unwrap();
        let history = mgr.history(Some("k"), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        // history is DESC; history[0] is the most recent transition.
        assert_eq!(history[0].old_value, Some(Value::from(1)));
        assert_eq!(history[0].new_value, Some(Value::from(2)));
        assert_eq!(history[1].old_value, None);
        assert_eq!(history[1].new_value, Some(Value::from(1)));
    }

    #[tokio::test]
    async fn replay_to_rewinds_to_the_target_transition() {
        let (mgr, _dir) = temp_manager();
        mgr.set("k", Value::from(1), None, None).await.unwrap();
        let history_after_first = mgr.history(Some("k"), 1).await.unwrap();
        let first_id = history_after_first[0].id.clone();
        mgr.set("k", Value::from(2), None, None).await.unwrap();
        assert_eq!(mgr.get("k").await.unwrap(), Some(Value::from(2)));
        mgr.replay_to(&first_id).await.unwrap();
        assert_eq!(mgr.get("k").await.unwrap(), Some(Value::from(1)));
    }
}
