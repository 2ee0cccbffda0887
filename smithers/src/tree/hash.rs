//! Content hash over `(type, sorted non-excluded props, recursive content
//! hashes of children)` (spec §3, §4.3).
//!
//! Grounded on the teacher's namespace-hashing helper in
//! `memory/sqlite_store.rs` (`ns_to_key`, stable JSON-keyed strings fed through
//! a deterministic digest) — same idea, applied to a tree instead of a flat
//! namespace.

use sha2::{Digest, Sha256};
use serde_json::Value;

use super::node::{Node, NodeKey};

/// Hex-encoded SHA-256 content hash. Cheap to compare, cheap to persist as a
/// SQL column (`nodes.content_hash`).
pub type ContentHash = String;

/// Computes the content hash of a node, recursing into children.
///
/// Hash for a node with no visible props and no children is derived from its
/// type alone (spec: "Hash for an empty claude node is simply its type").
pub fn content_hash(node: &Node) -> ContentHash {
    let mut hasher = Sha256::new();
    hash_into(node, &mut hasher);
    hex::encode(hasher.finalize())
}

fn hash_into(node: &Node, hasher: &mut Sha256) {
    hasher.update(node.node_type.to_lowercase().as_bytes());
    hasher.update([0u8]);

    if let Some(ref key) = node.key {
        hasher.update(b"key=");
        hash_key(key, hasher);
        hasher.update([0u8]);
    }

    for (name, value) in node.sorted_props() {
        hasher.update(name.as_bytes());
        hasher.update([b'=']);
        hash_value(value, hasher);
        hasher.update([0u8]);
    }

    hasher.update(b"children[");
    for child in &node.children {
        hash_into(child, hasher);
        hasher.update([b';']);
    }
    hasher.update(b"]");
}

fn hash_key(key: &NodeKey, hasher: &mut Sha256) {
    match key {
        NodeKey::String(s) => hasher.update(s.as_bytes()),
        NodeKey::Number(n) => hasher.update(n.to_string().as_bytes()),
    }
}

/// Canonical JSON serialisation is stable for our purposes: `serde_json`
/// preserves object insertion order and we never mutate a prop's map shape
/// after construction, so two structurally-equal values always serialise
/// identically.
fn hash_value(value: &Value, hasher: &mut Sha256) {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hasher.update(&bytes);
}
