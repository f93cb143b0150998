//! Per-project session actor.
//!
//! Each live project is owned by one tokio task that serializes every
//! mutation of its document (single-writer-per-session). The transport hands
//! the actor commands over an mpsc mailbox; commands received while the actor
//! is still bootstrapping simply queue until the prior content has been
//! fetched and imported. Sessions for different projects run fully in
//! parallel and share no mutable state.

use crate::registry::SessionRegistry;
use crate::{CoeditError, Document, LamportClock, ProjectStore, Result};
use coedit_types::{
    Connected, CursorBroadcast, ParticipantId, PeerNotice, ServerMessage, SourceChange,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Mailbox capacity per session; also bounds how far a burst of operations
/// can run ahead of the actor.
const COMMAND_BUFFER: usize = 64;

/// Opaque connection handle assigned by the transport layer. The core never
/// sees raw sockets, only this stable comparable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the session pushes at a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMessage),
    /// The session has terminated this connection's membership; the
    /// transport should close the socket.
    Close,
}

/// In-session operation already past the handshake stage.
#[derive(Debug, Clone)]
pub enum SessionOp {
    Source(SourceChange),
    Cursor(Value),
}

pub(crate) enum SessionCommand {
    Join { conn: ConnId, user: String, sink: mpsc::Sender<Outbound> },
    Frame { conn: ConnId, op: SessionOp },
    Leave { conn: ConnId },
}

/// Cheap cloneable handle to a session actor. The generation id lets the
/// registry evict exactly the session that announced its own teardown.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    pub(crate) tx: mpsc::Sender<SessionCommand>,
    pub(crate) generation: Uuid,
}

/// Spawns the actor task for a project and returns its handle.
pub(crate) fn spawn(
    project: String,
    owner: String,
    store: Arc<dyn ProjectStore>,
    registry: Weak<SessionRegistry>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let generation = Uuid::new_v4();
    let actor = SessionActor {
        project,
        owner,
        generation,
        doc: Document::new(),
        clock: LamportClock::new(),
        participants: HashMap::new(),
        sinks: HashMap::new(),
        cursors: HashMap::new(),
        next_participant: 1,
        ever_joined: false,
        store,
        registry,
    };
    tokio::spawn(actor.run(rx));
    SessionHandle { tx, generation }
}

struct SessionActor {
    project: String,
    owner: String,
    generation: Uuid,
    doc: Document,
    clock: LamportClock,
    participants: HashMap<ConnId, ParticipantId>,
    sinks: HashMap<ConnId, mpsc::Sender<Outbound>>,
    cursors: HashMap<ParticipantId, Value>,
    next_participant: u32,
    ever_joined: bool,
    store: Arc<dyn ProjectStore>,
    registry: Weak<SessionRegistry>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        self.bootstrap().await;

        while let Some(cmd) = rx.recv().await {
            match cmd {
                SessionCommand::Join { conn, sink, .. } => self.handle_join(conn, sink).await,
                SessionCommand::Frame { conn, op } => self.handle_frame(conn, op).await,
                SessionCommand::Leave { conn } => self.handle_leave(conn).await,
            }
            // Lifetime is exactly the interval during which participants is
            // non-empty: the last leave (or last dead sink) closes the
            // session.
            if self.ever_joined && self.participants.is_empty() {
                break;
            }
        }

        self.close(rx).await;
    }

    /// Fetches prior content and imports it. A failed download is a data
    /// loss risk, but refusing the session would make the project
    /// unavailable; the session starts from empty content and the failure
    /// is logged loudly.
    async fn bootstrap(&mut self) {
        let text = match self.store.download(&self.owner, &self.project).await {
            Ok(text) => text,
            Err(e) => {
                error!(
                    target: "coedit::session",
                    "Download failed for project '{}' (owner {}), starting empty: {}",
                    self.project, self.owner, e
                );
                String::new()
            }
        };
        self.doc = Document::from_text(&text);
        info!(
            target: "coedit::session",
            "Session for project '{}' ready ({} imported nodes)",
            self.project,
            self.doc.len()
        );
    }

    async fn handle_join(&mut self, conn: ConnId, sink: mpsc::Sender<Outbound>) {
        if self.participants.contains_key(&conn) {
            warn!(target: "coedit::session", "Duplicate join from connection {}", conn);
            return;
        }
        let id = self.allocate_participant();

        let dead = self
            .broadcast(ServerMessage::NewClientConnected(PeerNotice { client_id: id }), None)
            .await;

        self.participants.insert(conn, id);
        self.sinks.insert(conn, sink);
        self.ever_joined = true;

        let mut clients_connected_ids: Vec<ParticipantId> =
            self.participants.values().copied().collect();
        clients_connected_ids.sort();

        let snapshot = ServerMessage::Connected(Connected {
            document: self.doc.nodes().to_vec(),
            client_id: id,
            clients_connected_ids,
            cursors_positions: self.cursors.clone(),
            init_clock: self.clock.value(),
        });
        self.send_to(conn, snapshot).await;

        info!(
            target: "coedit::session",
            "Participant {} joined project '{}' ({} connected)",
            id, self.project, self.participants.len()
        );
        self.reap(dead).await;
    }

    async fn handle_frame(&mut self, conn: ConnId, op: SessionOp) {
        let Some(&sender) = self.participants.get(&conn) else {
            // The dispatcher only forwards frames after a successful join, so
            // this is a protocol-level defect on the transport side.
            warn!(target: "coedit::session", "{}", CoeditError::UnknownParticipant(conn));
            self.kick(conn).await;
            return;
        };

        match op {
            SessionOp::Source(change) => {
                if let Err(e) = self.apply_source_change(&change) {
                    warn!(
                        target: "coedit::session",
                        "Rejecting participant {} in project '{}': {}",
                        sender, self.project, e
                    );
                    self.kick(conn).await;
                    return;
                }
                // Every participant runs the same deterministic merge, so
                // relaying the raw operation is enough for convergence.
                let dead = self
                    .broadcast(ServerMessage::SourceChange(change), Some(conn))
                    .await;
                self.reap(dead).await;
            }
            SessionOp::Cursor(position) => {
                self.cursors.insert(sender, position.clone());
                let dead = self
                    .broadcast(
                        ServerMessage::CursorMove(CursorBroadcast { client_id: sender, position }),
                        Some(conn),
                    )
                    .await;
                self.reap(dead).await;
            }
        }
    }

    fn apply_source_change(&mut self, change: &SourceChange) -> Result<()> {
        if change.insert.is_none() && change.delete.is_none() {
            return Err(CoeditError::ProtocolViolation(
                "source change carries neither insert nor delete".into(),
            ));
        }
        if let Some(run) = &change.insert {
            let seen = self.doc.integrate_insert(run)?;
            self.clock.observe(seen);
        }
        if let Some(ids) = &change.delete {
            self.doc.apply_delete(ids);
        }
        debug!(
            target: "coedit::session",
            "Applied change to project '{}' ({} nodes, clock {})",
            self.project,
            self.doc.len(),
            self.clock.value()
        );
        Ok(())
    }

    async fn handle_leave(&mut self, conn: ConnId) {
        self.reap(vec![conn]).await;
    }

    /// Terminates a connection's membership from the server side.
    async fn kick(&mut self, conn: ConnId) {
        if let Some(sink) = self.sinks.get(&conn) {
            let _ = sink.send(Outbound::Close).await;
        }
        self.reap(vec![conn]).await;
    }

    /// Removes participants and announces each departure. Broadcasting can
    /// surface more dead sinks, so this loops until the set is drained.
    async fn reap(&mut self, mut dead: Vec<ConnId>) {
        while let Some(conn) = dead.pop() {
            let Some(id) = self.participants.remove(&conn) else {
                continue;
            };
            self.sinks.remove(&conn);
            self.cursors.remove(&id);
            info!(
                target: "coedit::session",
                "Participant {} left project '{}' ({} connected)",
                id, self.project, self.participants.len()
            );
            let more = self
                .broadcast(ServerMessage::ClientDisconnected(PeerNotice { client_id: id }), None)
                .await;
            dead.extend(more);
        }
    }

    /// Fans a message out to every connected participant except `except`.
    /// Returns the connections whose sink has gone away.
    async fn broadcast(&self, msg: ServerMessage, except: Option<ConnId>) -> Vec<ConnId> {
        let mut dead = Vec::new();
        for (&conn, sink) in &self.sinks {
            if Some(conn) == except {
                continue;
            }
            if sink.send(Outbound::Message(msg.clone())).await.is_err() {
                dead.push(conn);
            }
        }
        dead
    }

    async fn send_to(&self, conn: ConnId, msg: ServerMessage) {
        if let Some(sink) = self.sinks.get(&conn) {
            let _ = sink.send(Outbound::Message(msg)).await;
        }
    }

    /// Fresh unique participant id, collision-checked against live ids.
    fn allocate_participant(&mut self) -> ParticipantId {
        loop {
            let candidate = ParticipantId(self.next_participant);
            self.next_participant = self.next_participant.wrapping_add(1).max(1);
            if !self.participants.values().any(|&id| id == candidate) {
                return candidate;
            }
        }
    }

    /// Teardown: flush the materialized document, deregister, then re-route
    /// any join that raced the teardown so it lands in a fresh session.
    async fn close(self, mut rx: mpsc::Receiver<SessionCommand>) {
        let text = self.doc.materialize();
        if let Err(e) = self.store.upload(&self.owner, &self.project, &text).await {
            error!(
                target: "coedit::session",
                "Upload failed for project '{}' (owner {}), content dropped: {}",
                self.project, self.owner, e
            );
        }

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        registry.evict(&self.project, self.generation);
        info!(target: "coedit::session", "Session for project '{}' closed", self.project);

        // The registry entry (and its mailbox sender) is gone; drain what
        // remains until the last transient handle drops.
        while let Some(cmd) = rx.recv().await {
            if let SessionCommand::Join { conn, user, sink } = cmd {
                debug!(
                    target: "coedit::session",
                    "Re-routing join that raced teardown of project '{}'", self.project
                );
                registry.join(&self.project, &user, conn, sink).await;
            }
        }
    }
}
