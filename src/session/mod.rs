//! Session management
//!
//! One [`Session`] actor runs per accepted connection. After the external
//! handshake it either registers a new pusher for its path or asks the registry
//! to attach it to the existing one, and it undoes that on every exit path:
//! publishers remove their pusher, viewers detach from theirs.

pub mod context;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::registry::{AttachOutcome, Pusher, PusherRegistry, Viewer};
use crate::server::{Refusal, Role, SessionHandler};

pub use context::SessionContext;
pub use state::{SessionPhase, SessionState};

/// Per-connection protocol actor
pub struct Session<H: SessionHandler> {
    state: SessionState,
    stream: TcpStream,
    registry: Arc<PusherRegistry>,
    handler: Arc<H>,
    shutdown: CancellationToken,
}

impl<H: SessionHandler> Session<H> {
    /// Create a session for an accepted connection
    pub fn new(
        session_id: u64,
        stream: TcpStream,
        peer_addr: SocketAddr,
        registry: Arc<PusherRegistry>,
        handler: Arc<H>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state: SessionState::new(session_id, peer_addr),
            stream,
            registry,
            handler,
            shutdown,
        }
    }

    /// Session ID
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Run the session to completion
    ///
    /// Returns early, without error, when the shutdown token fires.
    pub async fn run(mut self) -> Result<()> {
        let result = self.drive().await;
        self.state.close();

        tracing::debug!(
            session_id = self.state.id,
            path = ?self.state.path,
            duration_ms = self.state.duration().as_millis() as u64,
            "Session finished"
        );

        result
    }

    async fn drive(&mut self) -> Result<()> {
        self.state.start_handshake();
        let ctx = self.state.context();

        let role = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(()),
            role = self.handler.handshake(&ctx, &mut self.stream) => role?,
        };

        self.state.on_role(&role);
        let ctx = self.state.context();

        match role {
            Role::Publish { path } => self.publish(ctx, path).await,
            Role::Play { path } => self.play(ctx, path).await,
        }
    }

    async fn publish(&mut self, ctx: SessionContext, path: String) -> Result<()> {
        let (pusher, sink) = Pusher::new(path.as_str(), self.state.id, self.registry.config());

        if !self.registry.add_pusher(Arc::clone(&pusher)).await {
            self.handler
                .refuse(&ctx, &mut self.stream, Refusal::PathInUse)
                .await?;
            return Err(Error::PathInUse(path));
        }

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => Ok(()),
            result = self.handler.publish(&ctx, &mut self.stream, sink) => result,
        };

        pusher.close();
        self.registry.remove_pusher(&pusher).await;

        result
    }

    async fn play(&mut self, ctx: SessionContext, path: String) -> Result<()> {
        let capacity = self.registry.config().viewer_queue_capacity;
        let (viewer, feed) = Viewer::new(self.state.id, path.as_str(), capacity);

        let pusher = match self.registry.try_attach_to_pusher(&viewer).await {
            AttachOutcome::Attached(pusher) => pusher,
            AttachOutcome::NotFound => {
                self.handler
                    .refuse(&ctx, &mut self.stream, Refusal::NotFound)
                    .await?;
                return Err(Error::PathNotFound(path));
            }
            AttachOutcome::Rejected => {
                self.handler
                    .refuse(&ctx, &mut self.stream, Refusal::Rejected)
                    .await?;
                return Err(Error::AttachRejected(path));
            }
        };

        // The pusher must hold the only sender so the feed ends with the relay
        drop(viewer);

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => Ok(()),
            result = self.handler.play(&ctx, &mut self.stream, feed) => result,
        };

        pusher.detach_session(self.state.id);

        result
    }
}
