//! Configuration settings for the authd broker.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DaemonError;

/// Main configuration structure for the daemon.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    /// Path to the Unix socket file.
    #[serde(default = "default_socket_path")]
    pub path: PathBuf,
    /// Socket file permissions (e.g., "0770").
    #[serde(default = "default_socket_permissions")]
    pub permissions: String,
    /// Group the socket file is handed to. `None` leaves the daemon's group.
    #[serde(default = "default_socket_group")]
    pub group: Option<String>,
}

/// Filesystem layout the broker works against.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `<module>.module/module.xml`.
    #[serde(default = "default_module_root")]
    pub module_root: PathBuf,
    /// Directory holding `<module>/<file>` staged sources.
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,
    /// Directory holding the privileged helper scripts.
    #[serde(default = "default_tools_root")]
    pub tools_root: PathBuf,
    /// Socket of the software update service.
    #[serde(default = "default_update_socket")]
    pub update_socket: PathBuf,
}

/// Policy cache and trust anchors.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// How long a loaded module.xml stays valid.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Owner every staged source file must have.
    #[serde(default = "default_staging_identity")]
    pub staging_user: String,
    /// Group every staged source file must have.
    #[serde(default = "default_staging_identity")]
    pub staging_group: String,
    /// Group whose members may receive files and directories in their home.
    #[serde(default = "default_panel_users_group")]
    pub panel_users_group: String,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    /// Number of worker threads.
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// How long a worker waits for a connection before rechecking shutdown.
    #[serde(default = "default_accept_timeout")]
    pub accept_timeout_ms: u64,
    /// Per-read timeout on an established connection.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Consecutive read timeouts before an idle session is dropped.
    #[serde(default = "default_idle_rounds")]
    pub idle_rounds: u32,
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum length of a request line in bytes.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Kill helper scripts running longer than this. Unset means no limit.
    #[serde(default)]
    pub script_timeout_seconds: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the audit log file.
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/opencore/sockets/authd/authd.sock")
}

fn default_socket_permissions() -> String {
    "0770".to_string()
}

fn default_socket_group() -> Option<String> {
    Some("authd".to_string())
}

fn default_module_root() -> PathBuf {
    PathBuf::from("/var/opencore/modules")
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("/var/opencore/conf/staging")
}

fn default_tools_root() -> PathBuf {
    PathBuf::from("/var/opencore/tools")
}

fn default_update_socket() -> PathBuf {
    PathBuf::from("/var/opencore/sockets/swupd/swupd.sock")
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_staging_identity() -> String {
    "opencore".to_string()
}

fn default_panel_users_group() -> String {
    "paneluser".to_string()
}

fn default_worker_count() -> usize {
    8
}

fn default_accept_timeout() -> u64 {
    2500
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_idle_rounds() -> u32 {
    30
}

fn default_max_line_length() -> usize {
    65_536
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/authd/audit.log")
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: default_socket_path(),
            permissions: default_socket_permissions(),
            group: default_socket_group(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            module_root: default_module_root(),
            staging_root: default_staging_root(),
            tools_root: default_tools_root(),
            update_socket: default_update_socket(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl(),
            staging_user: default_staging_identity(),
            staging_group: default_staging_identity(),
            panel_users_group: default_panel_users_group(),
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            accept_timeout_ms: default_accept_timeout(),
            read_timeout_ms: default_read_timeout(),
            idle_rounds: default_idle_rounds(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_line_length: default_max_line_length(),
            script_timeout_seconds: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
        }
    }
}

impl WorkersConfig {
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl PolicyConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

impl LimitsConfig {
    pub fn script_timeout(&self) -> Option<Duration> {
        self.script_timeout_seconds.map(Duration::from_secs)
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DaemonError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DaemonError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::parse(&content).map_err(|e| match e {
            DaemonError::Config { message } => DaemonError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(content: &str) -> Result<Self, DaemonError> {
        let settings: Settings = toml::from_str(content).map_err(|e| DaemonError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    fn validate(&self) -> Result<(), DaemonError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(DaemonError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(DaemonError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        if u32::from_str_radix(&self.socket.permissions, 8).is_err() {
            return Err(DaemonError::Config {
                message: format!(
                    "Invalid socket permissions '{}'. Must be octal (e.g., '0770')",
                    self.socket.permissions
                ),
            });
        }

        if self.workers.count == 0 {
            return Err(DaemonError::Config {
                message: "workers.count must be at least 1".to_string(),
            });
        }

        if self.workers.read_timeout_ms == 0 || self.workers.accept_timeout_ms == 0 {
            return Err(DaemonError::Config {
                message: "worker timeouts must be non-zero".to_string(),
            });
        }

        if self.limits.max_line_length == 0 {
            return Err(DaemonError::Config {
                message: "limits.max_line_length must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}
