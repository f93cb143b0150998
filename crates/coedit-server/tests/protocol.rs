//! Integration tests for the WebSocket protocol dispatcher.
//!
//! These drive the real server over a loopback TCP listener with
//! tokio-tungstenite clients, exercising the handshake state machine, the
//! join snapshot, and relay between participants.

use coedit_core::MemoryStore;
use coedit_server::{config::Config, router, state::AppState};
use coedit_types::{
    decode_server, encode_client, CharNode, ClientMessage, Handshake, NodeId, ParticipantId,
    Priority, ServerMessage, SourceChange,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the app on an ephemeral loopback port.
async fn spawn_server(store: Arc<MemoryStore>) -> SocketAddr {
    let state = Arc::new(AppState::with_store(Config::default(), store));
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

async fn send(ws: &mut WsClient, msg: &ClientMessage) {
    let text = encode_client(msg).unwrap();
    ws.send(Message::Text(text)).await.unwrap();
}

async fn recv(ws: &mut WsClient) -> ServerMessage {
    loop {
        match timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return decode_server(&text).unwrap(),
            Ok(Some(Ok(_))) => continue,
            other => panic!("expected server frame, got {:?}", other.map(|_| ())),
        }
    }
}

/// True when the server has closed the connection.
async fn closed(ws: &mut WsClient) -> bool {
    matches!(
        timeout(Duration::from_secs(2), ws.next()).await,
        Ok(None) | Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_)))
    )
}

fn handshake(project: &str, user: &str) -> ClientMessage {
    ClientMessage::Handshake(Handshake {
        project_id: project.to_string(),
        user_id: user.to_string(),
    })
}

fn insert_change(site: u32, clock: u64, text: &str) -> ClientMessage {
    let mut nodes = Vec::new();
    let mut parent = None;
    for (i, value) in text.chars().enumerate() {
        let id = NodeId { site: ParticipantId(site), counter: i as u64 + 1 };
        nodes.push(CharNode {
            id,
            parent,
            priority: Priority { clock, site: ParticipantId(site) },
            value,
            deleted: false,
        });
        parent = Some(id);
    }
    ClientMessage::SourceChange(SourceChange { insert: Some(nodes), delete: None })
}

#[tokio::test]
async fn handshake_yields_snapshot_of_stored_content() {
    let store = Arc::new(MemoryStore::new());
    store.put("ada", "notes", "hi");
    let addr = spawn_server(store).await;

    let mut ws = connect(addr).await;
    send(&mut ws, &handshake("notes", "ada")).await;

    let ServerMessage::Connected(snapshot) = recv(&mut ws).await else {
        panic!("expected snapshot");
    };
    assert_eq!(snapshot.client_id, ParticipantId(1));
    let text: String =
        snapshot.document.iter().filter(|n| !n.deleted).map(|n| n.value).collect();
    assert_eq!(text, "hi");
}

#[tokio::test]
async fn operation_before_handshake_closes_connection() {
    let addr = spawn_server(Arc::new(MemoryStore::new())).await;

    let mut ws = connect(addr).await;
    send(&mut ws, &insert_change(1, 1, "x")).await;
    assert!(closed(&mut ws).await);
}

#[tokio::test]
async fn malformed_frame_closes_connection() {
    let addr = spawn_server(Arc::new(MemoryStore::new())).await;

    let mut ws = connect(addr).await;
    ws.send(Message::Text("not json".to_string())).await.unwrap();
    assert!(closed(&mut ws).await);
}

#[tokio::test]
async fn repeated_handshake_closes_connection() {
    let addr = spawn_server(Arc::new(MemoryStore::new())).await;

    let mut ws = connect(addr).await;
    send(&mut ws, &handshake("p", "ada")).await;
    let ServerMessage::Connected(_) = recv(&mut ws).await else {
        panic!("expected snapshot");
    };
    send(&mut ws, &handshake("p", "ada")).await;
    assert!(closed(&mut ws).await);
}

#[tokio::test]
async fn changes_relay_between_participants() {
    let addr = spawn_server(Arc::new(MemoryStore::new())).await;

    let mut ws_a = connect(addr).await;
    send(&mut ws_a, &handshake("p", "ada")).await;
    let ServerMessage::Connected(snapshot_a) = recv(&mut ws_a).await else {
        panic!("expected snapshot");
    };
    assert_eq!(snapshot_a.client_id, ParticipantId(1));

    let mut ws_b = connect(addr).await;
    send(&mut ws_b, &handshake("p", "grace")).await;
    let ServerMessage::Connected(snapshot_b) = recv(&mut ws_b).await else {
        panic!("expected snapshot");
    };
    assert_eq!(snapshot_b.client_id, ParticipantId(2));

    // A hears about B joining.
    let ServerMessage::NewClientConnected(notice) = recv(&mut ws_a).await else {
        panic!("expected join notice");
    };
    assert_eq!(notice.client_id, ParticipantId(2));

    // A's edit reaches B verbatim.
    let change = insert_change(1, 1, "ok");
    send(&mut ws_a, &change).await;
    let ServerMessage::SourceChange(relayed) = recv(&mut ws_b).await else {
        panic!("expected relayed change");
    };
    let ClientMessage::SourceChange(sent) = change else { unreachable!() };
    assert_eq!(relayed, sent);

    // B's departure is announced to A.
    drop(ws_b);
    let ServerMessage::ClientDisconnected(notice) = recv(&mut ws_a).await else {
        panic!("expected leave notice");
    };
    assert_eq!(notice.client_id, ParticipantId(2));
}

#[tokio::test]
async fn disconnect_of_last_participant_persists_content() {
    let store = Arc::new(MemoryStore::new());
    let addr = spawn_server(store.clone()).await;

    let mut ws = connect(addr).await;
    send(&mut ws, &handshake("notes", "ada")).await;
    let ServerMessage::Connected(_) = recv(&mut ws).await else {
        panic!("expected snapshot");
    };
    send(&mut ws, &insert_change(1, 1, "saved")).await;
    ws.close(None).await.unwrap();

    for _ in 0..200 {
        if store.get("ada", "notes").as_deref() == Some("saved") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("content was never persisted");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let state = Arc::new(AppState::with_store(
        Config::default(),
        Arc::new(MemoryStore::new()),
    ));
    let server = axum_test::TestServer::new(router(state)).unwrap();
    let response = server.get("/api/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["status"], "ok");
}
