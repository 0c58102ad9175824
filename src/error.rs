//! Error types for the relay core
//!
//! Only startup failures escape [`RtspServer::start`](crate::RtspServer::start).
//! Everything else is produced by a session task and logged by the accept loop.
//! Registry outcomes such as a duplicate registration or a stale removal are
//! plain return values, not errors.

use std::net::SocketAddr;

/// Error type for relay operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket I/O failure on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called while the accept loop is already running
    #[error("server already running")]
    AlreadyRunning,

    /// The server was stopped and cannot accept again
    #[error("server stopped")]
    Stopped,

    /// The external protocol handshake failed
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Another publisher is already registered at this path
    #[error("path already published: {0}")]
    PathInUse(String),

    /// No publisher is registered at this path
    #[error("no publisher at path: {0}")]
    PathNotFound(String),

    /// The publisher at this path refused a new viewer
    #[error("attach rejected at path: {0}")]
    AttachRejected(String),

    /// The relay task for this path has already finished
    #[error("relay closed: {0}")]
    RelayClosed(String),
}

/// Convenience alias for `Result<T, Error>`
pub type Result<T> = std::result::Result<T, Error>;
