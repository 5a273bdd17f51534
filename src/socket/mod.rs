//! Unix socket server.
//!
//! A fixed number of worker threads take turns accepting on one listening
//! socket. Each worker serves a single connection at a time from greeting to
//! commit or rollback, then goes back to accepting.

mod listener;
mod metrics;
mod peer;
mod worker;

pub use listener::{SocketListener, WorkerPool};
pub use metrics::ConnectionMetrics;
pub use peer::{peer_credentials, PeerInfo};
