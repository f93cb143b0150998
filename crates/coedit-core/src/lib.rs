//! Core engine for the coedit collaboration server: the sequence CRDT,
//! per-project session actors, the session registry, and the persistence
//! adapter interface.

mod clock;
mod document;
mod error;
mod persistence;
mod registry;
mod session;

pub use clock::LamportClock;
pub use document::Document;
pub use error::CoeditError;
pub use persistence::{HttpStore, MemoryStore, ProjectStore, StoreError};
pub use registry::SessionRegistry;
pub use session::{ConnId, Outbound, SessionOp};

/// Result type for coedit operations.
pub type Result<T> = std::result::Result<T, CoeditError>;
