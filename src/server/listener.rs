//! Relay server listener
//!
//! Handles TCP accept loop and spawns session actors.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use socket2::SockRef;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::registry::{PusherRegistry, RelayConfig};
use crate::server::config::ServerConfig;
use crate::server::handler::SessionHandler;
use crate::session::Session;
use crate::stats::ServerStats;

/// Relay server
///
/// Owns the accept loop and the pusher registry. Sessions and relay tasks are
/// spawned on a shared [`TaskTracker`] under a common cancellation token, so
/// [`stop`](Self::stop) can both signal and wait for them.
pub struct RtspServer<H: SessionHandler> {
    config: ServerConfig,
    handler: Arc<H>,
    registry: Arc<PusherRegistry>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,

    running: AtomicBool,
    stopped: AtomicBool,
    shutdown: CancellationToken,
    tasks: TaskTracker,

    started_at: Mutex<Option<Instant>>,
    total_connections: AtomicU64,
    rejected_connections: AtomicU64,
    active_connections: Arc<AtomicU64>,
}

impl<H: SessionHandler> RtspServer<H> {
    /// Create a new server with the given configuration and handler
    pub fn new(config: ServerConfig, handler: H) -> Self {
        Self::with_relay_config(config, handler, RelayConfig::default())
    }

    /// Create a new server with custom relay configuration
    pub fn with_relay_config(config: ServerConfig, handler: H, relay_config: RelayConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();
        let registry = PusherRegistry::with_runtime(relay_config, shutdown.child_token(), tasks.clone());

        Self {
            config,
            handler: Arc::new(handler),
            registry: Arc::new(registry),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
            shutdown,
            tasks,
            started_at: Mutex::new(None),
            total_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            active_connections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a reference to the pusher registry
    pub fn registry(&self) -> &Arc<PusherRegistry> {
        &self.registry
    }

    /// Bind the listener and run the accept loop until [`stop`](Self::stop)
    ///
    /// A bind failure is returned immediately; accept failures are logged and
    /// the loop keeps going.
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })
    }

    /// Run the accept loop on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Stopped);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }

        self.stopped.store(false, Ordering::Release);
        *self.started_at.lock() = Some(Instant::now());

        match listener.local_addr() {
            Ok(addr) => tracing::info!(addr = %addr, "RTSP server listening"),
            Err(_) => tracing::info!(addr = %self.config.bind_addr, "RTSP server listening"),
        }

        self.accept_loop(listener).await;
        self.running.store(false, Ordering::Release);

        tracing::debug!("Accept loop exited");
        Ok(())
    }

    /// Stop accepting, clear the registry and wait for in-flight tasks
    ///
    /// Waits at most `shutdown_timeout` for sessions and relays to drain.
    pub async fn stop(&self) {
        tracing::info!(addr = %self.config.bind_addr, "RTSP server stop");

        self.stopped.store(true, Ordering::Release);
        self.shutdown.cancel();

        let pushers = self.registry.clear().await;
        for pusher in pushers.values() {
            pusher.close();
        }

        self.tasks.close();
        if tokio::time::timeout(self.config.shutdown_timeout, self.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tasks.len(),
                timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                "Shutdown timed out with tasks still running"
            );
        }
    }

    /// Whether the accept loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the server is stopped (or was never started)
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Server-wide counters
    pub async fn stats(&self) -> ServerStats {
        let started_at = *self.started_at.lock();

        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            active_pushers: self.registry.get_pusher_size().await,
            uptime: started_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    async fn accept_loop(&self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    if self.exits_on_accept_error() {
                        break;
                    }
                }
            }
        }
    }

    /// Only the stopped flag turns an accept failure into an exit
    fn exits_on_accept_error(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.rejected_connections.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        self.configure_socket(&socket);

        let registry = Arc::clone(&self.registry);
        let handler = Arc::clone(&self.handler);
        let shutdown = self.shutdown.child_token();
        let active = Arc::clone(&self.active_connections);
        active.fetch_add(1, Ordering::Relaxed);

        self.tasks.spawn(async move {
            let _permit = permit;
            let session = Session::new(session_id, socket, peer_addr, registry, handler, shutdown);

            if let Err(e) = session.run().await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Session error"
                );
            }

            active.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    /// Tune an accepted socket; failures are logged and otherwise ignored
    fn configure_socket(&self, socket: &TcpStream) {
        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let sock = SockRef::from(socket);
        if self.config.tcp_recv_buffer > 0 {
            if let Err(e) = sock.set_recv_buffer_size(self.config.tcp_recv_buffer) {
                tracing::warn!(error = %e, size = self.config.tcp_recv_buffer, "Failed to set read buffer");
            }
        }
        if self.config.tcp_send_buffer > 0 {
            if let Err(e) = sock.set_send_buffer_size(self.config.tcp_send_buffer) {
                tracing::warn!(error = %e, size = self.config.tcp_send_buffer, "Failed to set write buffer");
            }
        }
    }
}
