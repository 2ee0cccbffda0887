//! Lightweight SQL write classifier (spec §4.1 "Invalidation model").
//!
//! Extracts the writer table for `INSERT/UPDATE/DELETE/REPLACE/CREATE/DROP/
//! ALTER` statements, and — for `UPDATE ... WHERE col = ?` / `DELETE FROM ...
//! WHERE col = ?` — the single-column row filter those statements structurally
//! satisfy. Anything it can't decode falls back to table-level invalidation,
//! matching the spec's documented fallback rather than guessing.

use once_cell::sync::Lazy;
use regex::Regex;

/// A write's effect on the invalidation model: which table(s) it touched, and
/// — when decodable — the single `(column, param_index)` filter an `UPDATE`
/// or `DELETE` applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEffect {
    pub tables: Vec<String>,
    pub row_filter: Option<RowFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    /// Index into the statement's bound params (0-based) supplying the value
    /// the row filter compares against.
    pub param_index: usize,
}

static RE_INSERT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*INSERT\s+(?:OR\s+\w+\s+)?INTO\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static RE_REPLACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*REPLACE\s+INTO\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static RE_UPDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*UPDATE\s+([A-Za-z_][A-Za-z0-9_]*)\s+SET\s+.*?(?:WHERE\s+([A-Za-z_][A-Za-z0-9_]*)\s*=\s*\?)?\s*$").unwrap()
});
static RE_DELETE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*DELETE\s+FROM\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:WHERE\s+([A-Za-z_][A-Za-z0-9_]*)\s*=\s*\?)?\s*$").unwrap()
});
static RE_CREATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*CREATE\s+(?:TABLE|INDEX)\s+(?:IF\s+NOT\s+EXISTS\s+)?([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static RE_DROP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*DROP\s+(?:TABLE|INDEX)\s+(?:IF\s+EXISTS\s+)?([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static RE_ALTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*ALTER\s+TABLE\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// `true` for statement keywords the classifier treats as writes at all.
/// Non-write statements (`SELECT`, `PRAGMA`, ...) never fire invalidations.
pub fn is_write_statement(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    let upper_prefix: String = trimmed
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_uppercase();
    matches!(
        upper_prefix.as_str(),
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "CREATE" | "DROP" | "ALTER"
    )
}

/// Classifies a single SQL statement. Returns `None` for non-write
/// statements. A write statement the regexes can't parse still yields a
/// `WriteEffect` with an empty `tables` list — callers fall back to
/// invalidating everything, per spec.
pub fn classify(sql: &str) -> Option<WriteEffect> {
    if !is_write_statement(sql) {
        return None;
    }

    if let Some(caps) = RE_INSERT.captures(sql) {
        return Some(WriteEffect {
            tables: vec![caps[1].to_string()],
            row_filter: None,
        });
    }
    if let Some(caps) = RE_REPLACE.captures(sql) {
        return Some(WriteEffect {
            tables: vec![caps[1].to_string()],
            row_filter: None,
        });
    }
    if let Some(caps) = RE_UPDATE.captures(sql) {
        let table = caps[1].to_string();
        let row_filter = caps.get(2).map(|m| RowFilter {
            column: m.as_str().to_string(),
            param_index: last_param_index(sql),
        });
        return Some(WriteEffect {
            tables: vec![table],
            row_filter,
        });
    }
    if let Some(caps) = RE_DELETE.captures(sql) {
        let table = caps[1].to_string();
        let row_filter = caps.get(2).map(|m| RowFilter {
            column: m.as_str().to_string(),
            param_index: last_param_index(sql),
        });
        return Some(WriteEffect {
            tables: vec![table],
            row_filter,
        });
    }
    if let Some(caps) = RE_CREATE.captures(sql) {
        return Some(WriteEffect {
            tables: vec![caps[1].to_string()],
            row_filter: None,
        });
    }
    if let Some(caps) = RE_DROP.captures(sql) {
        return Some(WriteEffect {
            tables: vec![caps[1].to_string()],
            row_filter: None,
        });
    }
    if let Some(caps) = RE_ALTER.captures(sql) {
        return Some(WriteEffect {
            tables: vec![caps[1].to_string()],
            row_filter: None,
        });
    }

    // Recognised as a write keyword but structurally undecodable: fall back
    // to table-level (in fact store-wide) invalidation.
    Some(WriteEffect {
        tables: Vec::new(),
        row_filter: None,
    })
}

fn last_param_index(sql: &str) -> usize {
    sql.matches('?').count().saturating_sub(1)
}
