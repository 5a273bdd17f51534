//! authd: privileged broker for panel modules.
//!
//! Unprivileged modules connect over a Unix socket, name themselves, and ask
//! for privileged file, account, service and script operations. Every request
//! is checked against the module's own `module.xml` policy before a helper
//! runs, and all work done in one session forms a transaction that is either
//! committed or rolled back when the session ends.

pub mod accounts;
pub mod audit;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod policy;
pub mod protocol;
pub mod socket;
pub mod validation;
