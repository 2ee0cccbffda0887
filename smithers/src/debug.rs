//! Debug event bus (spec §4.6 step 8, §6 "Debug event stream").
//!
//! Grounded on `stream_event::envelope::{Envelope, EnvelopeState}`: the same
//! session/event-id stamping, applied to a different event taxonomy (frame
//! and node lifecycle instead of graph node streaming).

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use stream_event::envelope::EnvelopeState;

use crate::engine::TerminationReason;
use crate::tree::Node;

/// One record in the debug event stream (spec §6). `type` discriminates;
/// fields vary per variant the way `stream_event::ProtocolEvent` does.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebugEvent {
    SessionStart,
    SessionEnd,
    FrameStart { frame: u32 },
    FrameEnd { frame: u32 },
    NodeExecuteStart { node_key: String, node_type: String },
    NodeExecuteEnd { node_key: String, node_type: String, success: bool },
    /// One streamed chunk, already passed through every middleware's
    /// `transform_chunk` (spec §4.4/§4.6 step 7) — never the adapter's raw
    /// chunk.
    NodeChunk { node_key: String, content: String, is_final: bool },
    /// Carries a [`NodeSnapshot`] stripped of callables, matching the tree
    /// module's own serialisation rules (never emits raw [`Node`] values).
    TreeUpdate { tree: NodeSnapshot },
    Log { level: String, message: String },
    LoopTerminated { reason: TerminationReason },
}

/// A debug-event-safe view of a node: type, key, visible props, children.
/// Strips callables the same way [`crate::tree::xml::to_canonical_xml`]
/// does for its own output.
#[derive(Clone, Debug, Serialize)]
pub struct NodeSnapshot {
    #[serde(rename = "type")]
    pub node_type: String,
    pub key: Option<String>,
    pub props: std::collections::BTreeMap<String, Value>,
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub fn from_node(node: &Node) -> Self {
        Self {
            node_type: node.node_type.clone(),
            key: node.key.as_ref().map(|k| k.to_string()),
            props: node.visible_props().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            children: node.children.iter().map(Self::from_node).collect(),
        }
    }
}

/// Sink a [`DebugEvent`] is delivered to. Delivery is synchronous (spec §5
/// "Backpressure": "subscribers that cannot keep up must implement their own
/// queues — the engine does not buffer unboundedly").
pub type DebugSink = Arc<dyn Fn(Value) + Send + Sync>;

/// Stamps envelope fields (`session_id`, `event_id`) onto each event before
/// handing it to the configured sink. `None` when debug output is disabled
/// (spec §4.6 options: `debug:{enabled, ...}`).
pub struct DebugBus {
    sink: Option<DebugSink>,
    state: std::sync::Mutex<EnvelopeState>,
}

impl DebugBus {
    pub fn new(session_id: impl Into<String>, sink: Option<DebugSink>) -> Self {
        Self {
            sink,
            state: std::sync::Mutex::new(EnvelopeState::new(session_id.into())),
        }
    }

    pub fn disabled() -> Self {
        Self::new(String::new(), None)
    }

    pub fn emit(&self, event: DebugEvent) {
        let Some(sink) = &self.sink else { return };
        let Ok(mut value) = serde_json::to_value(&event) else { return };
        let mut state = self.state.lock().unwrap();
        state.inject_into(&mut value);
        drop(state);
        sink(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::Node as TreeNode;
    use std::sync::Mutex;

    #[test]
    fn emits_nothing_when_disabled() {
        let bus = DebugBus::disabled();
        bus.emit(DebugEvent::SessionStart);
    }

    #[test]
    fn stamps_session_and_event_id() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let c2 = collected.clone();
        let bus = DebugBus::new("sess-1", Some(Arc::new(move |v| c2.lock().unwrap().push(v))));
        bus.emit(DebugEvent::FrameStart { frame: 1 });
        bus.emit(DebugEvent::FrameEnd { frame: 1 });
        let events = collected.lock().unwrap();
        assert_eq!(events[0]["session_id"], "sess-1");
        assert_eq!(events[0]["type"], "frame_start");
        assert_eq!(events[1]["event_id"], events[0]["event_id"].as_u64().unwrap() + 1);
    }

    #[test]
    fn node_snapshot_strips_reserved_and_callable_props() {
        let mut node = TreeNode::new("claude");
        node.set_prop("prompt", Value::String("hi".into()));
        node.set_callable("onFinished");
        let snapshot = NodeSnapshot::from_node(&node);
        assert_eq!(snapshot.node_type, "claude");
        assert_eq!(snapshot.props.len(), 1);
        assert!(snapshot.props.contains_key("prompt"));
    }
}
