//! WebSocket connection handling: the protocol dispatcher.
//!
//! Each connection gets an opaque [`ConnId`] and a writer task fed through
//! an mpsc sink; the session layer only ever sees the id and the sink. The
//! inbound loop enforces the handshake state machine: the first frame must
//! be a client handshake, a second handshake (or any frame before one, or a
//! malformed frame) is a protocol violation that terminates the connection.

use crate::state::AppState;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use coedit_core::{ConnId, Outbound, SessionOp};
use coedit_types::{decode_client, encode_server, ClientMessage};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outbound buffer per connection; a client that stops draining its socket
/// eventually backpressures the session actor instead of growing memory.
const OUTBOUND_BUFFER: usize = 256;

pub async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let conn = ConnId::new();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<Outbound>(OUTBOUND_BUFFER);

    // Writer task: serializes session pushes onto the socket. Ends when the
    // session terminates the membership or every sink handle is gone.
    let send_task = tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            match out {
                Outbound::Message(msg) => {
                    let json = match encode_server(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(target: "coedit::ws", "Failed to serialize outbound frame: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                        debug!(target: "coedit::ws", "WebSocket send failed (client likely disconnected): {}", e);
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // None until the connection has handshaken into a project.
    let mut project: Option<String> = None;

    while let Some(Ok(msg)) = ws_rx.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        if text.len() > state.config.max_frame_bytes {
            warn!(
                target: "coedit::ws",
                "Frame too large ({} bytes, max {}) on connection {}",
                text.len(),
                state.config.max_frame_bytes,
                conn
            );
            break;
        }

        match decode_client(&text) {
            Ok(ClientMessage::Handshake(handshake)) => {
                if project.is_some() {
                    warn!(target: "coedit::ws", "Repeated handshake on connection {}", conn);
                    break;
                }
                info!(
                    target: "coedit::ws",
                    "Connection {} handshake: project '{}', user '{}'",
                    conn, handshake.project_id, handshake.user_id
                );
                state
                    .registry
                    .join(&handshake.project_id, &handshake.user_id, conn, out_tx.clone())
                    .await;
                project = Some(handshake.project_id);
            }
            Ok(ClientMessage::SourceChange(change)) => {
                let Some(project) = project.as_deref() else {
                    warn!(target: "coedit::ws", "Source change before handshake on connection {}", conn);
                    break;
                };
                if !state.registry.frame(project, conn, SessionOp::Source(change)).await {
                    debug!(target: "coedit::ws", "Session for '{}' is gone, dropping connection {}", project, conn);
                    break;
                }
            }
            Ok(ClientMessage::CursorMove(cursor)) => {
                let Some(project) = project.as_deref() else {
                    warn!(target: "coedit::ws", "Cursor move before handshake on connection {}", conn);
                    break;
                };
                if !state.registry.frame(project, conn, SessionOp::Cursor(cursor.position)).await {
                    break;
                }
            }
            Err(e) => {
                warn!(
                    target: "coedit::ws",
                    "Protocol violation on connection {}: {}", conn, e
                );
                break;
            }
        }
    }

    if let Some(project) = &project {
        state.registry.leave(project, conn).await;
    }

    // Once the session has dropped its sink clone the writer drains and
    // exits on its own.
    drop(out_tx);
    let _ = send_task.await;

    Ok(())
}
