//! Handler context
//!
//! Context passed to [`SessionHandler`](crate::SessionHandler) callbacks
//! containing session information.

use std::net::SocketAddr;

use super::state::SessionPhase;

/// Context passed to SessionHandler callbacks
///
/// A read-only snapshot; it is refreshed after the handshake resolves a role.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Phase at the time the snapshot was taken
    pub phase: SessionPhase,

    /// Stream path, once the handshake resolved one
    pub path: Option<String>,
}

impl SessionContext {
    /// Create a context for a freshly accepted connection
    pub fn new(session_id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            session_id,
            peer_addr,
            phase: SessionPhase::Connected,
            path: None,
        }
    }

    /// Path requested in the handshake, once known
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Whether the session publishes a stream
    pub fn is_publisher(&self) -> bool {
        self.phase == SessionPhase::Publishing
    }

    /// Whether the session watches a stream
    pub fn is_viewer(&self) -> bool {
        self.phase == SessionPhase::Playing
    }
}
