//! Statistics for the relay server and its pushers

pub mod metrics;

pub use metrics::{PusherStats, ServerStats};
