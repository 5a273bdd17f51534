//! Error types for the authd broker.

use std::fmt;

use thiserror::Error;

/// Main error type for the daemon.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Socket-related errors.
    #[error("Socket error: {message}")]
    Socket { message: String },

    /// Line protocol faults that end a session.
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// Policy document could not be read or validated.
    #[error("Policy document error: {kind}")]
    Document { kind: DocumentErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Protocol error kinds.
#[derive(Error, Debug)]
pub enum ProtocolErrorKind {
    #[error("Line too long: more than {max} bytes")]
    LineTooLong { max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection idle for {rounds} read timeouts")]
    IdleTimeout { rounds: u32 },
}

/// Policy document error kinds.
#[derive(Error, Debug)]
pub enum DocumentErrorKind {
    #[error("Malformed XML: {message}")]
    Malformed { message: String },

    #[error("Unexpected element <{element}> inside <{parent}>")]
    UnexpectedElement { element: String, parent: String },

    #[error("Element <{element}> is missing attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error("Invalid value '{value}' for attribute '{attribute}' on <{element}>")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Element <{element}> with id '{id}' has no path")]
    EmptyPath { element: String, id: String },

    #[error("Object '{id}' path must be absolute: {path}")]
    RelativeObjectPath { id: String, path: String },
}

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Numeric error codes sent on the wire in `-ERR:<code>:<message>` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Syntax,
    InvalidScript,
    NotFound,
    ScriptFailed,
    Policy,
    NotImplemented,
    CommandFailed,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        match self {
            ErrorCode::Syntax => 1,
            ErrorCode::InvalidScript => 4001,
            ErrorCode::NotFound => 4002,
            ErrorCode::ScriptFailed => 4003,
            ErrorCode::Policy => 4004,
            ErrorCode::NotImplemented => 4005,
            ErrorCode::CommandFailed => 4006,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// A command that could not be carried out.
///
/// Failures never end a session; they are reported to the client and the
/// connection stays open for the next command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct Failure {
    pub code: ErrorCode,
    pub message: String,
}

impl Failure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn syntax() -> Self {
        Self::new(ErrorCode::Syntax, "Unknown command")
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Policy, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CommandFailed, message)
    }
}

/// Outcome of a single brokered command.
pub type CommandResult<T = ()> = Result<T, Failure>;
