//! Error types for the authd broker.
//!
//! `DaemonError` covers faults of the daemon itself (configuration, socket,
//! protocol, documents). `Failure` is the per-command outcome that is written
//! back to the client as a single `-ERR` line.

mod types;

pub use types::*;
