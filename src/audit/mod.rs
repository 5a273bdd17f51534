//! Audit trail of brokered commands.
//!
//! Each dispatched command produces one JSON object on its own line, naming
//! the module, the transaction, the peer process and the outcome. Passwords
//! never reach the file.

mod entry;
mod logger;
mod sanitize;

pub use entry::{AuditEntry, AuditResult};
pub use logger::AuditLogger;
pub use sanitize::sanitize_fields;
