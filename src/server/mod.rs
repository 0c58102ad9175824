//! Relay server
//!
//! The accept loop, its configuration and the handler trait sessions call into.

pub mod config;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use handler::{Refusal, Role, SessionHandler};
pub use listener::RtspServer;
