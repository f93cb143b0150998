//! Process-wide project -> session registry.

use crate::persistence::ProjectStore;
use crate::session::{self, ConnId, Outbound, SessionCommand, SessionHandle, SessionOp};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Maps a project identifier to its single live session. Entries are created
/// by the first join and removed only by the session's own teardown; no two
/// sessions for the same project can exist simultaneously because creation
/// happens under the map's entry lock.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    store: Arc<dyn ProjectStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ProjectStore>) -> Arc<Self> {
        Arc::new(Self { sessions: DashMap::new(), store })
    }

    /// Routes a handshaken connection into the project's session, creating
    /// the session on first join. A handle whose actor has already exited is
    /// evicted and the join retried, so a join racing a teardown always lands
    /// in a live session.
    pub async fn join(
        self: &Arc<Self>,
        project: &str,
        user: &str,
        conn: ConnId,
        sink: mpsc::Sender<Outbound>,
    ) {
        loop {
            let handle = {
                let entry = self.sessions.entry(project.to_string()).or_insert_with(|| {
                    debug!(target: "coedit::registry", "Creating session for project '{}'", project);
                    session::spawn(
                        project.to_string(),
                        user.to_string(),
                        Arc::clone(&self.store),
                        Arc::downgrade(self),
                    )
                });
                entry.value().clone()
            };
            let join = SessionCommand::Join { conn, user: user.to_string(), sink: sink.clone() };
            match handle.tx.send(join).await {
                Ok(()) => return,
                Err(_) => self.evict(project, handle.generation),
            }
        }
    }

    /// Forwards an in-session operation. Returns `false` when no live
    /// session exists for the project, which terminates the connection.
    pub async fn frame(&self, project: &str, conn: ConnId, op: SessionOp) -> bool {
        let Some(handle) = self.sessions.get(project).map(|h| h.value().clone()) else {
            return false;
        };
        handle.tx.send(SessionCommand::Frame { conn, op }).await.is_ok()
    }

    /// Signals a transport-level disconnect.
    pub async fn leave(&self, project: &str, conn: ConnId) {
        if let Some(handle) = self.sessions.get(project).map(|h| h.value().clone()) {
            let _ = handle.tx.send(SessionCommand::Leave { conn }).await;
        }
    }

    /// Invoked only from a session's own teardown; the generation guard
    /// ensures a successor session is never evicted by its predecessor.
    pub(crate) fn evict(&self, project: &str, generation: Uuid) {
        self.sessions.remove_if(project, |_, handle| handle.generation == generation);
    }

    /// Whether a live session exists for `project`.
    pub fn contains(&self, project: &str) -> bool {
        self.sessions.contains_key(project)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
