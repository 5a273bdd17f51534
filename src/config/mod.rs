//! Daemon settings, read once at startup from a TOML file.
//!
//! Every key has a default, so an empty file describes the stock layout
//! under `/var/opencore`.

mod settings;

pub use settings::{
    AuditConfig, LimitsConfig, LoggingConfig, PathsConfig, PolicyConfig, Settings, SocketConfig,
    WorkersConfig,
};
