//! Pusher relay actor
//!
//! A pusher owns one actively published path. The publishing session feeds it
//! through a [`PublishSink`]; the relay task fans every packet out to the
//! viewers attached via [`Pusher::rebind_session`].
//!
//! `rebind_session` runs while the registry's write lock is held, so it only
//! touches the pusher's own viewer map and never awaits.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::config::RelayConfig;
use super::viewer::Viewer;
use crate::error::{Error, Result};
use crate::stats::PusherStats;

static NEXT_PUSHER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a pusher instance
///
/// Unique per instance, not per path: a path served by successive publishers
/// sees a different ID each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PusherId(u64);

impl PusherId {
    fn next() -> Self {
        Self(NEXT_PUSHER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PusherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Attached {
    viewers: HashMap<u64, mpsc::Sender<Bytes>>,
    closed: bool,
}

/// Relay actor for a single published path
#[derive(Debug)]
pub struct Pusher {
    id: PusherId,
    path: String,
    publisher_session: u64,
    max_viewers: usize,

    /// Taken by the relay task on start
    inbound: Mutex<Option<mpsc::Receiver<Bytes>>>,
    attached: Mutex<Attached>,
    started: AtomicBool,
    halt: CancellationToken,
    created_at: Instant,

    packets_in: AtomicU64,
    bytes_in: AtomicU64,
    packets_relayed: AtomicU64,
    packets_dropped: AtomicU64,
}

impl Pusher {
    /// Create a pusher for `path`, published by `publisher_session`
    ///
    /// Returns the pusher together with the sink its publisher writes into.
    /// Nothing is relayed until [`start`](Self::start) is called.
    pub fn new(
        path: impl Into<String>,
        publisher_session: u64,
        config: &RelayConfig,
    ) -> (Arc<Self>, PublishSink) {
        let path = path.into();
        let (tx, rx) = mpsc::channel(config.publish_queue_capacity.max(1));

        let pusher = Arc::new(Self {
            id: PusherId::next(),
            path: path.clone(),
            publisher_session,
            max_viewers: config.max_viewers_per_pusher,
            inbound: Mutex::new(Some(rx)),
            attached: Mutex::new(Attached::default()),
            started: AtomicBool::new(false),
            halt: CancellationToken::new(),
            created_at: Instant::now(),
            packets_in: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            packets_relayed: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
        });

        (pusher, PublishSink { path, tx })
    }

    /// Identity of this pusher instance
    pub fn id(&self) -> PusherId {
        self.id
    }

    /// Path this pusher serves
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Session ID of the publisher feeding this pusher
    pub fn publisher_session(&self) -> u64 {
        self.publisher_session
    }

    /// Spawn the relay task on `tasks`
    ///
    /// Only the first call spawns anything; later calls return `false`.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken, tasks: &TaskTracker) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!(pusher = %self, "Pusher already started");
            return false;
        }

        let Some(inbound) = self.inbound.lock().take() else {
            return false;
        };

        let pusher = Arc::clone(self);
        tasks.spawn(async move { pusher.relay(inbound, shutdown).await });
        true
    }

    /// Whether the relay task has been spawned
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Whether the relay has finished and stopped accepting viewers
    pub fn is_closed(&self) -> bool {
        self.attached.lock().closed
    }

    /// Ask the relay task to finish
    pub fn close(&self) {
        self.halt.cancel();
    }

    /// Attach a viewer
    ///
    /// Returns `false` when the relay has finished or the viewer limit is hit.
    /// Re-attaching an already attached session replaces its queue.
    pub fn rebind_session(&self, viewer: &Viewer) -> bool {
        let mut attached = self.attached.lock();

        if attached.closed {
            tracing::debug!(pusher = %self, session_id = viewer.session_id, "Rebind rejected: relay closed");
            return false;
        }

        if self.max_viewers > 0
            && attached.viewers.len() >= self.max_viewers
            && !attached.viewers.contains_key(&viewer.session_id)
        {
            tracing::debug!(
                pusher = %self,
                session_id = viewer.session_id,
                max_viewers = self.max_viewers,
                "Rebind rejected: viewer limit reached"
            );
            return false;
        }

        attached.viewers.insert(viewer.session_id, viewer.tx.clone());
        true
    }

    /// Detach a viewer, returning whether it was attached
    pub fn detach_session(&self, session_id: u64) -> bool {
        let removed = self.attached.lock().viewers.remove(&session_id).is_some();
        if removed {
            tracing::debug!(pusher = %self, session_id = session_id, "Viewer detached");
        }
        removed
    }

    /// Number of attached viewers
    pub fn viewer_count(&self) -> usize {
        self.attached.lock().viewers.len()
    }

    /// Snapshot of relay counters
    pub fn stats(&self) -> PusherStats {
        PusherStats {
            viewers: self.viewer_count(),
            packets_in: self.packets_in.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            packets_relayed: self.packets_relayed.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            uptime: self.created_at.elapsed(),
        }
    }

    async fn relay(self: Arc<Self>, mut inbound: mpsc::Receiver<Bytes>, shutdown: CancellationToken) {
        tracing::debug!(pusher = %self, "Relay started");

        let reason = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break "server shutdown",
                _ = self.halt.cancelled() => break "closed",
                packet = inbound.recv() => match packet {
                    Some(packet) => self.fan_out(packet),
                    None => break "publisher gone",
                },
            }
        };

        self.finish();
        tracing::debug!(pusher = %self, reason, "Relay finished");
    }

    fn fan_out(&self, packet: Bytes) {
        self.packets_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(packet.len() as u64, Ordering::Relaxed);

        let mut attached = self.attached.lock();
        attached.viewers.retain(|session_id, tx| match tx.try_send(packet.clone()) {
            Ok(()) => {
                self.packets_relayed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(path = %self.path, session_id = *session_id, "Viewer queue closed, pruning");
                false
            }
        });
    }

    /// Reject further rebinds and drop every viewer sender so feeds end
    fn finish(&self) {
        let mut attached = self.attached.lock();
        attached.closed = true;
        attached.viewers.clear();
    }
}

impl fmt::Display for Pusher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pusher[id={} path={}]", self.id, self.path)
    }
}

/// Publisher-side handle for feeding a pusher
///
/// Dropping the sink ends the relay once queued packets are drained.
#[derive(Debug)]
pub struct PublishSink {
    path: String,
    tx: mpsc::Sender<Bytes>,
}

impl PublishSink {
    /// Queue a packet for relay, waiting if the queue is full
    pub async fn send(&self, packet: Bytes) -> Result<()> {
        self.tx
            .send(packet)
            .await
            .map_err(|_| Error::RelayClosed(self.path.clone()))
    }

    /// Path this sink publishes to
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the relay task has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    fn start(pusher: &Arc<Pusher>) -> (CancellationToken, TaskTracker) {
        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();
        assert!(pusher.start(shutdown.clone(), &tasks));
        (shutdown, tasks)
    }

    #[test]
    fn test_ids_unique_per_instance() {
        let config = RelayConfig::default();
        let (a, _sink_a) = Pusher::new("/live/1", 1, &config);
        let (b, _sink_b) = Pusher::new("/live/1", 2, &config);

        assert_eq!(a.path(), b.path());
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_start_only_once() {
        let (pusher, _sink) = Pusher::new("/live/1", 1, &RelayConfig::default());
        let (_shutdown, tasks) = start(&pusher);

        assert!(pusher.is_started());
        assert!(!pusher.start(CancellationToken::new(), &tasks));
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_to_viewers() {
        let (pusher, sink) = Pusher::new("/live/1", 1, &RelayConfig::default());
        let (_shutdown, _tasks) = start(&pusher);

        let (v1, mut feed1) = Viewer::new(10, "/live/1", 8);
        let (v2, mut feed2) = Viewer::new(11, "/live/1", 8);
        assert!(pusher.rebind_session(&v1));
        assert!(pusher.rebind_session(&v2));
        assert_eq!(pusher.viewer_count(), 2);

        sink.send(Bytes::from_static(b"frame")).await.unwrap();

        let got1 = timeout(Duration::from_secs(1), feed1.recv()).await.unwrap();
        let got2 = timeout(Duration::from_secs(1), feed2.recv()).await.unwrap();
        assert_eq!(got1.as_deref(), Some(&b"frame"[..]));
        assert_eq!(got2.as_deref(), Some(&b"frame"[..]));

        let stats = pusher.stats();
        assert_eq!(stats.packets_in, 1);
        assert_eq!(stats.bytes_in, 5);
        assert_eq!(stats.packets_relayed, 2);
    }

    #[tokio::test]
    async fn test_publisher_drop_ends_relay() {
        let (pusher, sink) = Pusher::new("/live/1", 1, &RelayConfig::default());
        let (_shutdown, tasks) = start(&pusher);

        let (viewer, mut feed) = Viewer::new(10, "/live/1", 8);
        assert!(pusher.rebind_session(&viewer));

        drop(sink);
        tasks.close();
        timeout(Duration::from_secs(1), tasks.wait()).await.unwrap();

        assert!(pusher.is_closed());
        assert_eq!(pusher.viewer_count(), 0);
        drop(viewer);
        assert!(feed.recv().await.is_none());

        // A finished relay turns away new viewers
        let (late, _late_feed) = Viewer::new(11, "/live/1", 8);
        assert!(!pusher.rebind_session(&late));
    }

    #[tokio::test]
    async fn test_close_and_shutdown_end_relay() {
        let (closed, _sink_a) = Pusher::new("/live/a", 1, &RelayConfig::default());
        let (_shutdown_a, tasks_a) = start(&closed);
        closed.close();
        tasks_a.close();
        timeout(Duration::from_secs(1), tasks_a.wait()).await.unwrap();
        assert!(closed.is_closed());

        let (cancelled, sink_b) = Pusher::new("/live/b", 2, &RelayConfig::default());
        let (shutdown_b, tasks_b) = start(&cancelled);
        shutdown_b.cancel();
        tasks_b.close();
        timeout(Duration::from_secs(1), tasks_b.wait()).await.unwrap();
        assert!(cancelled.is_closed());
        assert!(sink_b.is_closed());
        assert!(matches!(
            sink_b.send(Bytes::from_static(b"late")).await,
            Err(Error::RelayClosed(_))
        ));
    }

    #[test]
    fn test_viewer_limit() {
        let config = RelayConfig::default().max_viewers_per_pusher(1);
        let (pusher, _sink) = Pusher::new("/live/1", 1, &config);

        let (v1, _f1) = Viewer::new(10, "/live/1", 8);
        let (v2, _f2) = Viewer::new(11, "/live/1", 8);
        assert!(pusher.rebind_session(&v1));
        assert!(!pusher.rebind_session(&v2));

        // Same session rebinding is not a new viewer
        assert!(pusher.rebind_session(&v1));

        assert!(pusher.detach_session(10));
        assert!(!pusher.detach_session(10));
        assert!(pusher.rebind_session(&v2));
    }

    #[tokio::test]
    async fn test_slow_viewer_drops_instead_of_blocking() {
        let (pusher, sink) = Pusher::new("/live/1", 1, &RelayConfig::default());
        let (_shutdown, _tasks) = start(&pusher);

        let (slow, mut slow_feed) = Viewer::new(10, "/live/1", 1);
        let (fast, mut fast_feed) = Viewer::new(11, "/live/1", 8);
        assert!(pusher.rebind_session(&slow));
        assert!(pusher.rebind_session(&fast));

        for i in 0..3u8 {
            sink.send(Bytes::from(vec![i])).await.unwrap();
        }
        for i in 0..3u8 {
            let got = timeout(Duration::from_secs(1), fast_feed.recv()).await.unwrap();
            assert_eq!(got.as_deref(), Some(&[i][..]));
        }

        assert_eq!(slow_feed.try_recv().as_deref(), Some(&[0u8][..]));
        assert!(slow_feed.try_recv().is_none());
        assert_eq!(pusher.stats().packets_dropped, 2);
    }

    #[tokio::test]
    async fn test_closed_viewer_pruned() {
        let (pusher, sink) = Pusher::new("/live/1", 1, &RelayConfig::default());
        let (_shutdown, _tasks) = start(&pusher);

        let (viewer, feed) = Viewer::new(10, "/live/1", 8);
        let (keeper, mut keeper_feed) = Viewer::new(11, "/live/1", 8);
        assert!(pusher.rebind_session(&viewer));
        assert!(pusher.rebind_session(&keeper));
        drop(feed);

        sink.send(Bytes::from_static(b"x")).await.unwrap();
        timeout(Duration::from_secs(1), keeper_feed.recv()).await.unwrap();

        assert_eq!(pusher.viewer_count(), 1);
    }
}
