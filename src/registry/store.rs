//! Pusher registry implementation
//!
//! The map of record from path to the single active pusher for that path.
//! Every insert and delete happens under the write lock; lookups take the read
//! lock. Attaching a viewer also takes the write lock because it calls into the
//! found pusher's `rebind_session` before releasing it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::config::RelayConfig;
use super::pusher::Pusher;
use super::viewer::Viewer;

/// Result of asking to attach a viewer to a path
#[derive(Debug, Clone)]
pub enum AttachOutcome {
    /// Nobody is publishing at the path
    NotFound,
    /// The pusher accepted the viewer
    Attached(Arc<Pusher>),
    /// A pusher exists but refused the viewer
    Rejected,
}

impl AttachOutcome {
    /// Numeric form: `1` attached, `0` not found, `-1` rejected
    pub fn code(&self) -> i32 {
        match self {
            AttachOutcome::Attached(_) => 1,
            AttachOutcome::NotFound => 0,
            AttachOutcome::Rejected => -1,
        }
    }

    /// The pusher, when attached
    pub fn pusher(&self) -> Option<&Arc<Pusher>> {
        match self {
            AttachOutcome::Attached(pusher) => Some(pusher),
            _ => None,
        }
    }
}

/// Central registry of active pushers
///
/// Thread-safe via `RwLock`. Holds at most one pusher per path.
pub struct PusherRegistry {
    /// Map of path to the pusher currently serving it
    pushers: RwLock<HashMap<String, Arc<Pusher>>>,

    /// Configuration handed to pushers created by sessions
    config: RelayConfig,

    /// Parent token for every relay task
    shutdown: CancellationToken,

    /// Tracker relay tasks are spawned on
    tasks: TaskTracker,
}

impl PusherRegistry {
    /// Create a standalone registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a standalone registry with custom configuration
    pub fn with_config(config: RelayConfig) -> Self {
        Self::with_runtime(config, CancellationToken::new(), TaskTracker::new())
    }

    /// Create a registry whose relay tasks hang off `shutdown` and `tasks`
    pub fn with_runtime(config: RelayConfig, shutdown: CancellationToken, tasks: TaskTracker) -> Self {
        Self {
            pushers: RwLock::new(HashMap::new()),
            config,
            shutdown,
            tasks,
        }
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Tracker holding the relay tasks started by this registry
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Register a pusher at its path
    ///
    /// The relay task is started only when the pusher is actually inserted.
    /// Returns `false` and leaves the map untouched when the path is taken or
    /// the registry is shutting down; the caller then owns (and discards) its
    /// pusher.
    pub async fn add_pusher(&self, pusher: Arc<Pusher>) -> bool {
        let mut pushers = self.pushers.write().await;

        if self.shutdown.is_cancelled() {
            tracing::debug!(pusher = %pusher, "Registry shutting down, pusher not added");
            return false;
        }

        if let Some(existing) = pushers.get(pusher.path()) {
            tracing::warn!(
                path = pusher.path(),
                existing = %existing.id(),
                rejected = %pusher.id(),
                "Path already has a pusher"
            );
            return false;
        }

        pushers.insert(pusher.path().to_string(), Arc::clone(&pusher));
        pusher.start(self.shutdown.child_token(), &self.tasks);

        tracing::info!(
            pusher = %pusher,
            session_id = pusher.publisher_session(),
            pushers = pushers.len(),
            "Pusher registered"
        );

        true
    }

    /// Attach a viewer to the pusher at its path
    ///
    /// The write lock is held across the pusher's `rebind_session`.
    pub async fn try_attach_to_pusher(&self, viewer: &Viewer) -> AttachOutcome {
        let pushers = self.pushers.write().await;

        let Some(pusher) = pushers.get(&viewer.path) else {
            return AttachOutcome::NotFound;
        };

        if pusher.rebind_session(viewer) {
            tracing::info!(
                pusher = %pusher,
                session_id = viewer.session_id,
                viewers = pusher.viewer_count(),
                "Attached to a pusher"
            );
            AttachOutcome::Attached(Arc::clone(pusher))
        } else {
            AttachOutcome::Rejected
        }
    }

    /// Remove a pusher from its path
    ///
    /// Only removes the entry when it is this very pusher; a successor that
    /// took over the path in the meantime is left alone.
    pub async fn remove_pusher(&self, pusher: &Pusher) -> bool {
        let mut pushers = self.pushers.write().await;

        match pushers.get(pusher.path()).map(|current| current.id()) {
            Some(current) if current == pusher.id() => {
                pushers.remove(pusher.path());
                tracing::info!(pusher = %pusher, pushers = pushers.len(), "Pusher end");
                true
            }
            Some(current) => {
                tracing::warn!(
                    path = pusher.path(),
                    stale = %pusher.id(),
                    current = %current,
                    "Stale pusher removal ignored"
                );
                false
            }
            None => false,
        }
    }

    /// Look up the pusher serving `path`
    pub async fn get_pusher(&self, path: &str) -> Option<Arc<Pusher>> {
        self.pushers.read().await.get(path).cloned()
    }

    /// Independent copy of the path → pusher map
    pub async fn get_pushers(&self) -> HashMap<String, Arc<Pusher>> {
        self.pushers.read().await.clone()
    }

    /// Number of registered pushers
    pub async fn get_pusher_size(&self) -> usize {
        self.pushers.read().await.len()
    }

    /// Swap the map for an empty one, returning what was registered
    pub async fn clear(&self) -> HashMap<String, Arc<Pusher>> {
        let mut pushers = self.pushers.write().await;
        std::mem::take(&mut *pushers)
    }
}

impl Default for PusherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::pusher::PublishSink;
    use super::*;

    fn pusher(path: &str, session_id: u64) -> (Arc<Pusher>, PublishSink) {
        Pusher::new(path, session_id, &RelayConfig::default())
    }

    #[tokio::test]
    async fn test_add_pusher() {
        let registry = PusherRegistry::new();
        let (p1, _p1_sink) = pusher("/live/1", 1);

        assert!(registry.add_pusher(Arc::clone(&p1)).await);
        assert_eq!(registry.get_pusher_size().await, 1);
        assert_eq!(registry.get_pusher("/live/1").await.unwrap().id(), p1.id());
        assert!(p1.is_started());
    }

    #[tokio::test]
    async fn test_duplicate_path_keeps_first() {
        let registry = PusherRegistry::new();
        let (p1, _p1_sink) = pusher("/live/1", 1);
        let (p2, _p2_sink) = pusher("/live/1", 2);

        assert!(registry.add_pusher(Arc::clone(&p1)).await);
        assert!(!registry.add_pusher(Arc::clone(&p2)).await);

        assert_eq!(registry.get_pusher_size().await, 1);
        assert_eq!(registry.get_pusher("/live/1").await.unwrap().id(), p1.id());
        assert!(!p2.is_started());
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_refused() {
        let shutdown = CancellationToken::new();
        let registry = PusherRegistry::with_runtime(RelayConfig::default(), shutdown.clone(), TaskTracker::new());
        let (p1, _p1_sink) = pusher("/live/1", 1);

        shutdown.cancel();

        assert!(!registry.add_pusher(Arc::clone(&p1)).await);
        assert_eq!(registry.get_pusher_size().await, 0);
        assert!(!p1.is_started());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_single_winner() {
        let registry = Arc::new(PusherRegistry::new());
        let (candidates, _sinks): (Vec<_>, Vec<_>) = (0..32).map(|i| pusher("/live/race", i)).unzip();

        let handles: Vec<_> = candidates
            .iter()
            .map(|p| {
                let registry = Arc::clone(&registry);
                let p = Arc::clone(p);
                tokio::spawn(async move { registry.add_pusher(p).await })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(registry.get_pusher_size().await, 1);
        assert_eq!(candidates.iter().filter(|p| p.is_started()).count(), 1);

        let winner = registry.get_pusher("/live/race").await.unwrap();
        assert!(winner.is_started());
    }

    #[tokio::test]
    async fn test_attach_outcomes() {
        let registry = PusherRegistry::new();
        let (p1, _p1_sink) = pusher("/live/1", 1);
        registry.add_pusher(Arc::clone(&p1)).await;

        let (viewer, _feed) = Viewer::new(10, "/live/1", 8);
        let outcome = registry.try_attach_to_pusher(&viewer).await;
        assert_eq!(outcome.code(), 1);
        assert_eq!(outcome.pusher().unwrap().id(), p1.id());
        assert_eq!(p1.viewer_count(), 1);

        let (stranger, _feed) = Viewer::new(11, "/live/2", 8);
        let outcome = registry.try_attach_to_pusher(&stranger).await;
        assert!(matches!(outcome, AttachOutcome::NotFound));
        assert_eq!(outcome.code(), 0);
        assert!(outcome.pusher().is_none());
    }

    #[tokio::test]
    async fn test_attach_rejected() {
        let config = RelayConfig::default().max_viewers_per_pusher(1);
        let registry = PusherRegistry::with_config(config.clone());
        let (p1, _sink) = Pusher::new("/live/1", 1, &config);
        registry.add_pusher(p1).await;

        let (first, _f1) = Viewer::new(10, "/live/1", 8);
        let (second, _f2) = Viewer::new(11, "/live/1", 8);
        assert_eq!(registry.try_attach_to_pusher(&first).await.code(), 1);

        let outcome = registry.try_attach_to_pusher(&second).await;
        assert!(matches!(outcome, AttachOutcome::Rejected));
        assert_eq!(outcome.code(), -1);
    }

    #[tokio::test]
    async fn test_remove_pusher() {
        let registry = PusherRegistry::new();
        let (p1, _p1_sink) = pusher("/live/1", 1);
        registry.add_pusher(Arc::clone(&p1)).await;

        assert!(registry.remove_pusher(&p1).await);
        assert_eq!(registry.get_pusher_size().await, 0);
        assert!(registry.get_pusher("/live/1").await.is_none());

        // Removing again is a no-op
        assert!(!registry.remove_pusher(&p1).await);
    }

    #[tokio::test]
    async fn test_stale_removal_keeps_successor() {
        let registry = PusherRegistry::new();
        let (p1, _p1_sink) = pusher("/live/1", 1);
        let (p2, _p2_sink) = pusher("/live/1", 2);

        registry.add_pusher(Arc::clone(&p1)).await;
        registry.remove_pusher(&p1).await;
        registry.add_pusher(Arc::clone(&p2)).await;
        let (other, _other_sink) = pusher("/live/other", 3);
        registry.add_pusher(other).await;

        // p1 retires late, after p2 already took the path
        assert!(!registry.remove_pusher(&p1).await);

        assert_eq!(registry.get_pusher_size().await, 2);
        assert_eq!(registry.get_pusher("/live/1").await.unwrap().id(), p2.id());
    }

    #[tokio::test]
    async fn test_snapshot_isolation() {
        let registry = PusherRegistry::new();
        let (p1, _p1_sink) = pusher("/live/1", 1);
        registry.add_pusher(p1).await;

        let mut snapshot = registry.get_pushers().await;
        snapshot.clear();
        snapshot.insert("/live/ghost".to_string(), pusher("/live/ghost", 2).0);

        assert_eq!(registry.get_pusher_size().await, 1);
        assert!(registry.get_pusher("/live/1").await.is_some());
        assert!(registry.get_pusher("/live/ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let registry = PusherRegistry::new();
        let (p1, _p1_sink) = pusher("/live/1", 1);
        let (p2, _p2_sink) = pusher("/live/2", 2);
        registry.add_pusher(p1).await;
        registry.add_pusher(p2).await;

        let drained = registry.clear().await;

        assert_eq!(drained.len(), 2);
        assert_eq!(registry.get_pusher_size().await, 0);
    }
}
