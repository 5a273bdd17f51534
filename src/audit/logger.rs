//! Append-only JSON-lines writer for audit entries.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::config::AuditConfig;
use crate::error::DaemonError;

use super::entry::AuditEntry;

/// Shared by all workers; writes are serialized through a mutex.
pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLogger {
    /// Open (or create, mode 0600) the log at `path` for appending.
    pub fn new(path: &Path) -> Result<Self, DaemonError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Build the logger the configuration asks for.
    ///
    /// A log that cannot be opened disables auditing with a warning rather
    /// than keeping the daemon from starting.
    pub fn from_config(config: &AuditConfig) -> Option<Self> {
        if !config.enabled {
            info!("Audit logging disabled");
            return None;
        }
        match Self::new(&config.log_path) {
            Ok(logger) => {
                info!(path = %config.log_path.display(), "Audit logging enabled");
                Some(logger)
            }
            Err(e) => {
                warn!(
                    path = %config.log_path.display(),
                    error = %e,
                    "Failed to open audit log, audit logging disabled"
                );
                None
            }
        }
    }

    /// Append one entry. Failures are logged and otherwise ignored.
    pub fn record(&self, entry: &AuditEntry) {
        if let Err(e) = self.write(entry) {
            warn!(command = %entry.command, error = %e, "Failed to write audit entry");
        }
    }

    fn write(&self, entry: &AuditEntry) -> Result<(), DaemonError> {
        let json = serde_json::to_string(entry)?;
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(file, "{}", json)?;
        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
