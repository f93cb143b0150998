//! Error types for the coedit core.

use crate::persistence::StoreError;
use crate::session::ConnId;
use coedit_types::NodeId;
use thiserror::Error;

/// Failure modes of the session/protocol layer.
///
/// Connection-scoped errors (`CausalDependencyMissing`, `ProtocolViolation`,
/// `UnknownParticipant`) terminate only the offending connection's session
/// membership; persistence failures are logged and degraded, never
/// propagated to clients. The core has no process-fatal errors of its own.
#[derive(Debug, Error)]
pub enum CoeditError {
    #[error("causal dependency missing: parent {0} not present in document")]
    CausalDependencyMissing(NodeId),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("operation from unknown participant on connection {0}")]
    UnknownParticipant(ConnId),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("malformed message: {0}")]
    Decode(#[from] coedit_types::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
