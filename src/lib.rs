//! Relay core for a live-media streaming server
//!
//! Accepts TCP connections, turns each into a [`Session`] actor and multiplexes
//! a single published stream per path to any number of viewers through a
//! [`PusherRegistry`].
//!
//! Protocol handshake and media I/O are supplied by the embedding application
//! through the [`SessionHandler`] trait. The core only decides who publishes
//! where and who watches what.
//!
//! ```text
//!   TcpListener ──accept──► Session ──handshake──► Role::Publish ──► add_pusher ──► Pusher task
//!                                                 Role::Play    ──► try_attach_to_pusher
//! ```

pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use registry::{
    AttachOutcome, PublishSink, Pusher, PusherId, PusherRegistry, RelayConfig, Viewer, ViewerFeed,
};
pub use server::{Refusal, Role, RtspServer, ServerConfig, SessionHandler};
pub use session::{Session, SessionContext, SessionPhase};
pub use stats::{PusherStats, ServerStats};
