//! Shared types for the coedit collaboration server.

mod node;
mod ws;

pub use node::*;
pub use ws::*;
