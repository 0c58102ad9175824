//! Viewer handles
//!
//! A [`Viewer`] is what a playing session hands to the registry when it asks to
//! be attached. The pusher keeps a clone of the sending half; the session keeps
//! the [`ViewerFeed`] and drains it towards its client.

use bytes::Bytes;
use tokio::sync::mpsc;

/// Attach request for a single playing session
#[derive(Debug, Clone)]
pub struct Viewer {
    /// Owning session ID
    pub session_id: u64,
    /// Path the session wants to watch
    pub path: String,
    pub(super) tx: mpsc::Sender<Bytes>,
}

impl Viewer {
    /// Create a viewer handle and the feed its session reads from
    pub fn new(session_id: u64, path: impl Into<String>, capacity: usize) -> (Self, ViewerFeed) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let viewer = Self {
            session_id,
            path: path.into(),
            tx,
        };
        (viewer, ViewerFeed { rx })
    }
}

/// Receiving end of a viewer's packet queue
///
/// `recv` yields `None` once the pusher has dropped this viewer, either because
/// the relay ended or because the viewer was detached.
#[derive(Debug)]
pub struct ViewerFeed {
    rx: mpsc::Receiver<Bytes>,
}

impl ViewerFeed {
    /// Wait for the next relayed packet
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take a packet if one is already queued
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}
