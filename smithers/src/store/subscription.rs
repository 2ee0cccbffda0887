//! Subscription registry for the reactive query layer (spec §4.1).
//!
//! Callbacks fire synchronously after commit, one at a time, in registration
//! order, on the writer's task (spec §5 "Subscriber callbacks... must be
//! non-blocking and fast"). Re-entrant subscribe/unsubscribe during a
//! callback is legal and takes effect on the next invalidation, which falls
//! out naturally from snapshotting the registry before iterating.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::classifier::WriteEffect;

pub type SubscriptionId = u64;

/// A plain table-level subscription: fires whenever any tracked table is
/// touched by a write.
struct TableSub {
    id: SubscriptionId,
    tables: Vec<String>,
    callback: Box<dyn Fn() + Send + Sync>,
}

/// A row-filtered subscription: fires on `INSERT` into the table unconditionally
/// (spec §9 open question: "always invalidate" is the source's behaviour and
/// is kept here), or on `UPDATE`/`DELETE` whose decoded row filter matches
/// `(column, value)`.
struct RowSub {
    id: SubscriptionId,
    table: String,
    column: String,
    value: String,
    callback: Box<dyn Fn() + Send + Sync>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    table_subs: Mutex<HashMap<SubscriptionId, TableSub>>,
    row_subs: Mutex<HashMap<SubscriptionId, RowSub>>,
    closed: Mutex<bool>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&self) -> SubscriptionId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn subscribe(
        &self,
        tables: Vec<String>,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.alloc_id();
        self.table_subs.lock().unwrap().insert(
            id,
            TableSub {
                id,
                tables,
                callback: Box::new(callback),
            },
        );
        id
    }

    pub fn subscribe_with_row_filter(
        &self,
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.alloc_id();
        self.row_subs.lock().unwrap().insert(
            id,
            RowSub {
                id,
                table: table.into(),
                column: column.into(),
                value: value.into(),
                callback: Box::new(callback),
            },
        );
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.table_subs.lock().unwrap().remove(&id);
        self.row_subs.lock().unwrap().remove(&id);
    }

    /// Fires every subscription unconditionally (`invalidate()` with no args).
    pub fn invalidate_all(&self) {
        if self.is_closed() {
            return;
        }
        self.fire_snapshot_table(|_| true);
        self.fire_snapshot_row(|_| true);
    }

    /// Fires subscriptions whose tracked tables intersect `tables`.
    pub fn invalidate_tables(&self, tables: &[String]) {
        if self.is_closed() {
            return;
        }
        self.fire_snapshot_table(|sub| sub.tables.iter().any(|t| tables.contains(t)));
        self.fire_snapshot_row(|sub| tables.contains(&sub.table));
    }

    /// Manual escape hatch: fires row subscriptions whose `(table, column,
    /// value)` matches any of `values`, plus table-level subs on `table`.
    pub fn invalidate_rows(&self, table: &str, column: &str, values: &[String]) {
        if self.is_closed() {
            return;
        }
        self.fire_snapshot_table(|sub| sub.tables.iter().any(|t| t == table));
        self.fire_snapshot_row(|sub| {
            sub.table == table && sub.column == column && values.contains(&sub.value)
        });
    }

    /// Applies a decoded write effect: `INSERT`/undecodable always invalidate
    /// at the table level; `UPDATE`/`DELETE` with a row filter narrow row subs
    /// to the matching `(column, value)`.
    pub fn apply_write(&self, effect: &WriteEffect, params: &[String]) {
        if self.is_closed() {
            return;
        }
        if effect.tables.is_empty() {
            // Undecodable statement: invalidate everything (documented fallback).
            self.invalidate_all();
            return;
        }
        self.fire_snapshot_table(|sub| sub.tables.iter().any(|t| effect.tables.contains(t)));

        match &effect.row_filter {
            Some(rf) => {
                let value = params.get(rf.param_index).cloned();
                self.fire_snapshot_row(|sub| {
                    effect.tables.contains(&sub.table)
                        && sub.column == rf.column
                        && Some(&sub.value) == value.as_ref()
                });
            }
            None => {
                // INSERT (or CREATE/DROP/ALTER): no prior row to filter by,
                // so row subs on the affected table always fire.
                self.fire_snapshot_row(|sub| effect.tables.contains(&sub.table));
            }
        }
    }

    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
        self.table_subs.lock().unwrap().clear();
        self.row_subs.lock().unwrap().clear();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    fn fire_snapshot_table(&self, matches: impl Fn(&TableSub) -> bool) {
        let subs = self.table_subs.lock().unwrap();
        let mut ids: Vec<_> = subs
            .values()
            .filter(|s| matches(s))
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(sub) = subs.get(&id) {
                (sub.callback)();
            }
        }
    }

    fn fire_snapshot_row(&self, matches: impl Fn(&RowSub) -> bool) {
        let subs = self.row_subs.lock().unwrap();
        let mut ids: Vec<_> = subs.values().filter(|s| matches(s)).map(|s| s.id).collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(sub) = subs.get(&id) {
                (sub.callback)();
            }
        }
    }
}
