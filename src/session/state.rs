//! Session state machine
//!
//! Tracks a relay session from accept to close.

use std::net::SocketAddr;
use std::time::Instant;

use super::context::SessionContext;
use crate::server::Role;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// TCP connected, handshake not started
    Connected,
    /// Handshake in progress
    Handshaking,
    /// Feeding a pusher
    Publishing,
    /// Attached to a pusher (or asking to be)
    Playing,
    /// Session closed
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Time when handshake completed
    pub handshake_completed_at: Option<Instant>,

    /// Stream path resolved by the handshake
    pub path: Option<String>,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connected,
            connected_at: Instant::now(),
            handshake_completed_at: None,
            path: None,
        }
    }

    /// Transition to handshaking phase
    pub fn start_handshake(&mut self) {
        if self.phase == SessionPhase::Connected {
            self.phase = SessionPhase::Handshaking;
        }
    }

    /// Complete the handshake with the role it resolved
    pub fn on_role(&mut self, role: &Role) {
        if self.phase != SessionPhase::Handshaking {
            return;
        }

        self.phase = match role {
            Role::Publish { .. } => SessionPhase::Publishing,
            Role::Play { .. } => SessionPhase::Playing,
        };
        self.path = Some(role.path().to_string());
        self.handshake_completed_at = Some(Instant::now());
    }

    /// Mark the session closed
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Check if the session has a role and is not closed
    pub fn is_active(&self) -> bool {
        matches!(self.phase, SessionPhase::Publishing | SessionPhase::Playing)
    }

    /// Snapshot handed to handler callbacks
    pub fn context(&self) -> SessionContext {
        SessionContext {
            session_id: self.id,
            peer_addr: self.peer_addr,
            phase: self.phase,
            path: self.path.clone(),
        }
    }
}
