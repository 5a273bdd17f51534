//! Server replies.

use std::fmt;

use crate::error::Failure;

/// A single status line sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Err(Failure),
    /// The greeting was not understood.
    BadGreeting,
    /// The session sat idle for too long.
    Timeout,
    /// The daemon is shutting down.
    Shutdown,
}

impl From<Failure> for Reply {
    fn from(failure: Failure) -> Self {
        Reply::Err(failure)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str("+OK"),
            Reply::Err(failure) => write!(f, "-ERR:{}:{}", failure.code, failure.message),
            Reply::BadGreeting => f.write_str("-WTF?"),
            Reply::Timeout => f.write_str("-TIMEOUT"),
            Reply::Shutdown => f.write_str("-SHUTDOWN"),
        }
    }
}
