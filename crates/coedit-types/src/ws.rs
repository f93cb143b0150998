//! WebSocket message protocol between client and server.
//!
//! Every frame is a JSON object carrying an integer `type` discriminant next
//! to the payload fields. serde's internally-tagged enums only support string
//! tags, so encoding and decoding go through an explicit envelope: payloads
//! are plain serde structs and [`decode_client`]/[`encode_server`] (and their
//! mirror functions) splice the discriminant in and out.

use crate::{CharNode, NodeId, ParticipantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Server -> joining client: full session snapshot.
pub const MSG_CONNECTED: u16 = 0;
/// Server -> others: a participant joined.
pub const MSG_NEW_CLIENT_CONNECTED: u16 = 1;
/// Server -> others: a participant left.
pub const MSG_CLIENT_DISCONNECTED: u16 = 2;
/// Client -> server -> others: document insert/delete delta.
pub const MSG_SOURCE_CHANGE: u16 = 3;
/// Client -> server -> others: cursor position update.
pub const MSG_CURSOR_MOVE: u16 = 4;
/// Client -> server: first frame on a connection, names project and user.
pub const MSG_CLIENT_HANDSHAKE: u16 = 999;

/// Failure to decode an inbound frame. Treated as a protocol violation by
/// the dispatcher: the offending connection is closed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown message type {0}")]
    UnknownType(u16),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// First frame a client must send on a new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub project_id: String,
    pub user_id: String,
}

/// A document delta: an insert run, a delete list, or (degenerately) both.
///
/// `insert` is an ordered run of new nodes: the first node names the intended
/// parent, each subsequent node is parented on its predecessor, so the run
/// splices into the sequence as one contiguous block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert: Option<Vec<CharNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Vec<NodeId>>,
}

/// Cursor update from a client. The position is opaque to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMove {
    #[serde(default)]
    pub position: Value,
}

/// Snapshot sent to a client right after it joins a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub document: Vec<CharNode>,
    pub client_id: ParticipantId,
    pub clients_connected_ids: Vec<ParticipantId>,
    pub cursors_positions: HashMap<ParticipantId, Value>,
    pub init_clock: u64,
}

/// Join/leave notice about another participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerNotice {
    pub client_id: ParticipantId,
}

/// Cursor update relayed to the other participants, stamped with the
/// server-authoritative sender id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorBroadcast {
    pub client_id: ParticipantId,
    pub position: Value,
}

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Handshake(Handshake),
    SourceChange(SourceChange),
    CursorMove(CursorMove),
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Connected(Connected),
    NewClientConnected(PeerNotice),
    ClientDisconnected(PeerNotice),
    SourceChange(SourceChange),
    CursorMove(CursorBroadcast),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: u16,
    #[serde(flatten)]
    payload: serde_json::Map<String, Value>,
}

fn seal(kind: u16, payload: Value) -> serde_json::Result<String> {
    let mut map = match payload {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    map.insert("type".to_string(), Value::from(kind));
    serde_json::to_string(&Value::Object(map))
}

/// Decode an inbound client frame.
pub fn decode_client(text: &str) -> Result<ClientMessage, DecodeError> {
    let env: Envelope = serde_json::from_str(text)?;
    let payload = Value::Object(env.payload);
    match env.kind {
        MSG_CLIENT_HANDSHAKE => Ok(ClientMessage::Handshake(serde_json::from_value(payload)?)),
        MSG_SOURCE_CHANGE => Ok(ClientMessage::SourceChange(serde_json::from_value(payload)?)),
        MSG_CURSOR_MOVE => Ok(ClientMessage::CursorMove(serde_json::from_value(payload)?)),
        other => Err(DecodeError::UnknownType(other)),
    }
}

/// Encode a client frame. Used by test clients and kept symmetric with
/// [`decode_client`].
pub fn encode_client(msg: &ClientMessage) -> serde_json::Result<String> {
    match msg {
        ClientMessage::Handshake(p) => seal(MSG_CLIENT_HANDSHAKE, serde_json::to_value(p)?),
        ClientMessage::SourceChange(p) => seal(MSG_SOURCE_CHANGE, serde_json::to_value(p)?),
        ClientMessage::CursorMove(p) => seal(MSG_CURSOR_MOVE, serde_json::to_value(p)?),
    }
}

/// Decode a server frame. Used by test clients.
pub fn decode_server(text: &str) -> Result<ServerMessage, DecodeError> {
    let env: Envelope = serde_json::from_str(text)?;
    let payload = Value::Object(env.payload);
    match env.kind {
        MSG_CONNECTED => Ok(ServerMessage::Connected(serde_json::from_value(payload)?)),
        MSG_NEW_CLIENT_CONNECTED => {
            Ok(ServerMessage::NewClientConnected(serde_json::from_value(payload)?))
        }
        MSG_CLIENT_DISCONNECTED => {
            Ok(ServerMessage::ClientDisconnected(serde_json::from_value(payload)?))
        }
        MSG_SOURCE_CHANGE => Ok(ServerMessage::SourceChange(serde_json::from_value(payload)?)),
        MSG_CURSOR_MOVE => Ok(ServerMessage::CursorMove(serde_json::from_value(payload)?)),
        other => Err(DecodeError::UnknownType(other)),
    }
}

/// Encode an outbound server frame.
pub fn encode_server(msg: &ServerMessage) -> serde_json::Result<String> {
    match msg {
        ServerMessage::Connected(p) => seal(MSG_CONNECTED, serde_json::to_value(p)?),
        ServerMessage::NewClientConnected(p) => {
            seal(MSG_NEW_CLIENT_CONNECTED, serde_json::to_value(p)?)
        }
        ServerMessage::ClientDisconnected(p) => {
            seal(MSG_CLIENT_DISCONNECTED, serde_json::to_value(p)?)
        }
        ServerMessage::SourceChange(p) => seal(MSG_SOURCE_CHANGE, serde_json::to_value(p)?),
        ServerMessage::CursorMove(p) => seal(MSG_CURSOR_MOVE, serde_json::to_value(p)?),
    }
}
