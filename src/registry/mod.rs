//! Path → pusher registry
//!
//! The registry holds at most one live [`Pusher`] per path. Publishing sessions
//! register a pusher; playing sessions ask to be attached to one.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<PusherRegistry>
//!                     ┌─────────────────────────┐
//!                     │ pushers: HashMap<path,  │
//!                     │   Arc<Pusher> {         │
//!                     │     inbound: mpsc::Rx,  │
//!                     │     viewers: {id → Tx}, │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]              [Viewer]                [Viewer]
//!    PublishSink::send()      ViewerFeed::recv()      ViewerFeed::recv()
//!         │                       ▲                       ▲
//!         └──► relay task ──try_send──────────────────────┘
//! ```
//!
//! # Lifecycle races
//!
//! - Two publishers racing for one path: exactly one `add_pusher` inserts and
//!   only that pusher's relay task is started.
//! - A retired pusher removing itself after a successor took the path:
//!   `remove_pusher` compares identities and leaves the successor alone.
//! - A viewer attaching while the relay winds down: the pusher refuses the
//!   rebind once it has finished, so the attach reports
//!   [`AttachOutcome::Rejected`].
//!
//! Packets are `bytes::Bytes`, so fan-out clones a reference count rather than
//! the payload.

pub mod config;
pub mod pusher;
pub mod store;
pub mod viewer;

pub use config::RelayConfig;
pub use pusher::{PublishSink, Pusher, PusherId};
pub use store::{AttachOutcome, PusherRegistry};
pub use viewer::{Viewer, ViewerFeed};
