//! Optional desktop bridge (spec §6): an ephemeral WebSocket the CLI connects
//! to with a short timeout, forwarding debug events when connected and
//! ignoring the failure otherwise. Grounded on `cli/src/backend/auto_start.rs`
//! for the "try to reach a local service, give up quietly" shape.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(300);
const DEFAULT_URL: &str = "ws://127.0.0.1:7777";

/// Control messages the desktop app can send back over the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DesktopControl {
    Cancel,
    OpenFile(String),
}

fn parse_control(value: &Value) -> Option<DesktopControl> {
    match value.get("type").and_then(Value::as_str)? {
        "cancel" => Some(DesktopControl::Cancel),
        "open-file" => {
            let path = value.get("path").and_then(Value::as_str)?.to_string();
            Some(DesktopControl::OpenFile(path))
        }
        _ => None,
    }
}

/// A connected bridge: events sent on [`DebugBus`](smithers::DebugBus)'s sink
/// are forwarded as WebSocket text frames; inbound control messages are
/// delivered on `controls`.
pub struct DesktopBridge {
    outbound: mpsc::UnboundedSender<Value>,
}

impl DesktopBridge {
    /// Builds a [`smithers::DebugSink`] that forwards every event to this
    /// bridge's outbound queue.
    pub fn sink(&self) -> smithers::DebugSink {
        let tx = self.outbound.clone();
        Arc::new(move |event: Value| {
            let _ = tx.send(event);
        })
    }
}

/// Attempts to connect to the desktop app's WebSocket endpoint within a short
/// timeout. Returns `None` (never an error) if nothing is listening, per
/// spec §6 "ignores failure". On success, returns a bridge plus a control
/// channel the caller can poll for `cancel`/`open-file` messages, and spawns
/// the forwarding task.
pub async fn connect(url: Option<&str>) -> Option<(DesktopBridge, mpsc::UnboundedReceiver<DesktopControl>)> {
    let url = url.unwrap_or(DEFAULT_URL).to_string();
    let connected = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&url)).await;
    let (stream, _response) = match connected {
        Ok(Ok(pair)) => pair,
        _ => return None,
    };

    let (mut write, mut read) = stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<DesktopControl>();

    tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(Ok(msg)) = read.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if let Some(control) = parse_control(&value) {
                if control_tx.send(control).is_err() {
                    break;
                }
            }
        }
    });

    Some((DesktopBridge { outbound: outbound_tx }, control_rx))
}
