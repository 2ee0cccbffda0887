//! Plan tree node: the sum-type replacement for the render layer's heterogeneous
//! dynamic tree (spec §3, §9 "Heterogeneous tree of dynamic types").
//!
//! A [`Node`] owns its children; parent back-references are held out-of-line by
//! [`crate::tree::arena`] as a non-owning index, never as part of the tree itself
//! (spec §9 "Back-references").

use std::collections::BTreeMap;

use serde_json::Value;

/// Distinguished root type; never self-serialises (§3).
pub const ROOT: &str = "root";
/// Distinguished text node; carries a scalar `value` prop.
pub const TEXT: &str = "text";
/// Stop-marker node type and its alias.
pub const SMITHERS_STOP: &str = "smithers-stop";
pub const STOP_ALIAS: &str = "stop";

/// Node types the serializer recognises for misuse warnings (§4.3).
pub const KNOWN_TYPES: &[&str] = &[
    "claude",
    "ralph",
    "phase",
    "step",
    "task",
    "persona",
    "constraints",
    "human",
    "smithers-stop",
    "subagent",
    "orchestration",
    "review",
    "text",
    "root",
    "messages",
    "message",
    "tool-call",
];

/// Node types the engine will dispatch against an adapter (spec §4.6 step 6, §9
/// "adopts the superset" of `claude`/`claude-cli` found across source variants).
pub const EXECUTABLE_TYPES: &[&str] = &["claude", "claude-cli", "codex", "gemini"];

/// Prop names excluded from content-hashing and serialisation (spec §3).
pub const RESERVED_PROP_NAMES: &[&str] = &[
    "children",
    "onFinished",
    "onError",
    "onStreamStart",
    "onStreamDelta",
    "onStreamEnd",
    "validate",
];

/// A node key: either a string or a number, used for sibling identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKey {
    String(String),
    Number(i64),
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKey::String(s) => write!(f, "{s}"),
            NodeKey::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A prop value: any JSON-representable value, or an opaque callable excluded
/// from serialisation and hashing (spec §3).
#[derive(Clone, Debug)]
pub enum PropValue {
    Json(Value),
    /// Callback/closure-shaped prop (`onFinished`, `validate`, ...); carried only
    /// for authoring ergonomics, never serialised or hashed. The render layer
    /// that produced the tree owns the actual closure; the engine only needs to
    /// know the slot exists so it can skip it uniformly.
    Callable,
}

/// One step in a declared agent program (spec §3 "Node").
///
/// Props are ordered (declaration order matters for canonical XML) but
/// deduplicated by name, matching the spec's "ordered mapping of props".
#[derive(Clone, Debug, Default)]
pub struct Node {
    pub node_type: String,
    pub key: Option<NodeKey>,
    props: Vec<(String, PropValue)>,
    pub children: Vec<Node>,
    /// Warnings attached by the serializer (spec §4.3); never alters output XML.
    pub warnings: Vec<String>,
}

impl Node {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            key: None,
            props: Vec::new(),
            children: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: NodeKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Sets (or replaces, preserving original position) a prop.
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_prop(name, value);
        self
    }

    pub fn set_prop(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = PropValue::Json(value.into());
        if let Some(existing) = self.props.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = value;
        } else {
            self.props.push((name, value));
        }
    }

    /// Marks a prop slot as an opaque callable (excluded from hash/serialisation).
    pub fn set_callable(&mut self, name: impl Into<String>) {
        let name = name.into();
        if let Some(existing) = self.props.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = PropValue::Callable;
        } else {
            self.props.push((name, PropValue::Callable));
        }
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.iter().find_map(|(n, v)| match v {
            PropValue::Json(val) if n == name => Some(val),
            _ => None,
        })
    }

    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.prop(name).and_then(Value::as_str)
    }

    pub fn prop_bool(&self, name: &str) -> Option<bool> {
        self.prop(name).and_then(Value::as_bool)
    }

    /// Props in declaration order, skipping reserved names and callables — the
    /// set that participates in both canonical XML and content hashing.
    pub fn visible_props(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.props.iter().filter_map(move |(name, value)| {
            if RESERVED_PROP_NAMES.contains(&name.as_str()) {
                return None;
            }
            match value {
                PropValue::Json(v) => Some((name.as_str(), v)),
                PropValue::Callable => None,
            }
        })
    }

    /// `true` when this node's lowercased type is in the executable set (§9).
    pub fn is_executable(&self) -> bool {
        let lower = self.node_type.to_lowercase();
        EXECUTABLE_TYPES.contains(&lower.as_str())
    }

    /// `true` when this node (or its alias) is a stop marker (§4.6 step 3).
    pub fn is_stop_marker(&self) -> bool {
        let lower = self.node_type.to_lowercase();
        lower == SMITHERS_STOP || lower == STOP_ALIAS
    }

    /// Convenience constructor for a TEXT leaf carrying a scalar `value` prop.
    pub fn text(value: impl Into<String>) -> Self {
        let mut n = Self::new(TEXT);
        n.set_prop("value", Value::String(value.into()));
        n
    }

    /// Pre-order iterator over this node and all descendants.
    pub fn preorder(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }

    /// Sorted snapshot of visible props, for stable hashing/testing.
    pub(crate) fn sorted_props(&self) -> BTreeMap<&str, &Value> {
        self.visible_props().collect()
    }
}

/// Pre-order depth-first traversal over a node and its descendants.
pub struct PreOrder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}
