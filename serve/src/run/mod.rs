//! Handle `Run` request: execute agent (streaming or single reply).
//!
//! Flow: request preparation (register thread, append initial message, build opts/cmd) →
//! spawn run task → consume event stream and send over WebSocket → send RunEnd or Error.

mod delivery;
mod request;
mod stream;

use axum::extract::ws::WebSocket;
use loom::{ProtocolEventEnvelope, ServerResponse};
use request::{PrepareRunInput, PrepareRunResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::app::RunConfig;

/// Entry point for a Run request: prepares run (register thread, append initial user
/// message, build options), spawns the agent task, and streams events + final RunEnd/Error
/// over the WebSocket. Returns `Ok(None)` in the normal streaming case (response already
/// sent); returns `Err` if streaming or sending the final response fails.
pub(crate) async fn handle_run(
    r: loom::RunRequest,
    socket: &mut WebSocket,
    workspace_store: Option<Arc<loom_workspace::Store>>,
    user_message_store: Option<Arc<dyn loom::UserMessageStore>>,
    run_config: &RunConfig,
) -> Result<Option<ServerResponse>, Box<dyn std::error::Error + Send + Sync>> {
    let PrepareRunResult {
        opts,
        cmd,
        initial_user_appended,
    } = request::prepare_run(
        r,
        workspace_store.as_ref(),
        user_message_store.as_ref(),
        PrepareRunInput {
            display_max_len: run_config.display_max_len,
        },
    )
    .await;

    let run_id = format!("run-{}", Uuid::new_v4());
    let session_id = run_id.clone();
    let (tx, rx) = mpsc::channel::<ProtocolEventEnvelope>(run_config.event_queue_capacity);
    let opts = opts.clone();
    let cmd = cmd.clone();
    let thread_id_for_append = opts.thread_id.clone();
    let user_message_store_for_append = user_message_store.clone();
    let run_handle = tokio::spawn(stream::run_agent_task(
        session_id,
        tx,
        opts,
        cmd,
        initial_user_appended,
        user_message_store_for_append,
        thread_id_for_append,
        run_config.append_queue_capacity,
    ));

    let mut sender = delivery::WebSocketRunSender(socket);
    delivery::handle_run_stream(run_id, rx, run_handle, &mut sender).await
}
