//! Session handler trait
//!
//! The relay core never parses the wire protocol itself. An implementation of
//! [`SessionHandler`] runs the handshake on each accepted connection, reports
//! whether the client publishes or plays, and moves media between the socket
//! and the relay.

use std::future::Future;

use tokio::net::TcpStream;

use crate::error::Result;
use crate::registry::{PublishSink, ViewerFeed};
use crate::session::SessionContext;

/// What a connection turned out to be after its handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Client sends media for `path`
    Publish { path: String },
    /// Client wants to watch `path`
    Play { path: String },
}

impl Role {
    /// Stream path named by the handshake
    pub fn path(&self) -> &str {
        match self {
            Role::Publish { path } | Role::Play { path } => path,
        }
    }
}

/// Why the registry turned a session away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Publish to a path that already has a publisher
    PathInUse,
    /// Play from a path nobody publishes
    NotFound,
    /// Play refused by the path's pusher (closing or full)
    Rejected,
}

/// Protocol callbacks for a single connection
///
/// Every method receives the connection's socket. Futures must be `Send`
/// because each session runs on its own task.
pub trait SessionHandler: Send + Sync + 'static {
    /// Run the protocol handshake and resolve the session's role
    fn handshake(
        &self,
        ctx: &SessionContext,
        stream: &mut TcpStream,
    ) -> impl Future<Output = Result<Role>> + Send;

    /// Read media from the client into `sink` until the stream ends
    ///
    /// Returning (with or without error) retires the session's pusher.
    fn publish(
        &self,
        ctx: &SessionContext,
        stream: &mut TcpStream,
        sink: PublishSink,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Write relayed media from `feed` to the client
    ///
    /// `feed` ends when the publisher goes away.
    fn play(
        &self,
        ctx: &SessionContext,
        stream: &mut TcpStream,
        feed: ViewerFeed,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Tell the client its publish or play request was refused
    fn refuse(
        &self,
        ctx: &SessionContext,
        stream: &mut TcpStream,
        refusal: Refusal,
    ) -> impl Future<Output = Result<()>> + Send;
}
