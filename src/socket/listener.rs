//! Socket setup and the fixed pool of worker threads.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::unistd::{chown, Gid};
use tracing::{debug, error, info, warn};

use crate::accounts::UserDirectory;
use crate::audit::AuditLogger;
use crate::commands::BrokerContext;
use crate::config::Settings;
use crate::error::DaemonError;

use super::metrics::ConnectionMetrics;
use super::worker::{serve_connection, Shared};

/// Pause between non-blocking accept attempts.
const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// Pause after an accept error before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(250);

/// A bound socket plus everything the workers will share.
pub struct SocketListener {
    listener: UnixListener,
    path: PathBuf,
    shared: Arc<Shared>,
    worker_count: usize,
    accept_timeout: Duration,
}

impl SocketListener {
    /// Create the socket file and the broker context.
    ///
    /// A stale socket is removed first; a symlink in its place is refused.
    pub fn bind(settings: &Settings, directory: Arc<dyn UserDirectory>) -> Result<Self, DaemonError> {
        let path = settings.socket.path.clone();

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if metadata.file_type().is_symlink() {
                return Err(DaemonError::Socket {
                    message: format!(
                        "Socket path {} is a symlink, refusing to remove it",
                        path.display()
                    ),
                });
            }
            std::fs::remove_file(&path).map_err(|e| DaemonError::Socket {
                message: format!("Failed to remove stale socket {}: {}", path.display(), e),
            })?;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DaemonError::Socket {
                message: format!(
                    "Failed to create socket directory {}: {}",
                    parent.display(),
                    e
                ),
            })?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| DaemonError::Socket {
            message: format!("Failed to bind to socket {}: {}", path.display(), e),
        })?;
        listener.set_nonblocking(true)?;

        if let Some(group) = &settings.socket.group {
            Self::set_socket_group(&path, group, directory.as_ref())?;
        }
        Self::set_socket_permissions(&path, &settings.socket.permissions)?;

        let ctx = Arc::new(BrokerContext::new(settings, Arc::clone(&directory)));
        let audit = AuditLogger::from_config(&settings.audit).map(Arc::new);

        info!(path = %path.display(), "Socket listener bound");

        Ok(Self {
            listener,
            path,
            shared: Arc::new(Shared {
                ctx,
                audit,
                metrics: Arc::new(ConnectionMetrics::new()),
                shutdown: Arc::new(AtomicBool::new(false)),
                read_timeout: settings.workers.read_timeout(),
                idle_rounds: settings.workers.idle_rounds,
                max_line: settings.limits.max_line_length,
            }),
            worker_count: settings.workers.count,
            accept_timeout: settings.workers.accept_timeout(),
        })
    }

    fn set_socket_group(path: &Path, group: &str, directory: &dyn UserDirectory) -> Result<(), DaemonError> {
        let entry = directory.group(group).ok_or_else(|| DaemonError::Socket {
            message: format!("Socket group '{}' does not exist", group),
        })?;
        chown(path, None, Some(Gid::from_raw(entry.gid))).map_err(|e| DaemonError::Socket {
            message: format!("Failed to set socket group on {}: {}", path.display(), e),
        })
    }

    fn set_socket_permissions(path: &Path, permissions: &str) -> Result<(), DaemonError> {
        let mode = u32::from_str_radix(permissions, 8).map_err(|e| DaemonError::Socket {
            message: format!("Invalid socket permissions '{}': {}", permissions, e),
        })?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            DaemonError::Socket {
                message: format!(
                    "Failed to set socket permissions on {}: {}",
                    path.display(),
                    e
                ),
            }
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The broker context the workers dispatch against.
    pub fn context(&self) -> Arc<BrokerContext> {
        Arc::clone(&self.shared.ctx)
    }

    pub fn metrics(&self) -> Arc<ConnectionMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Spawn the worker threads. Each one accepts and serves connections
    /// until shutdown is requested.
    pub fn start(self) -> Result<WorkerPool, DaemonError> {
        let listener = Arc::new(Mutex::new(self.listener));
        let mut workers = Vec::with_capacity(self.worker_count);

        for id in 0..self.worker_count {
            let listener = Arc::clone(&listener);
            let shared = Arc::clone(&self.shared);
            let accept_timeout = self.accept_timeout;
            let handle = thread::Builder::new()
                .name(format!("authd-worker-{}", id))
                .spawn(move || worker_loop(id, &listener, &shared, accept_timeout))?;
            workers.push(handle);
        }

        info!(workers = workers.len(), "Worker pool started");
        Ok(WorkerPool {
            workers,
            shared: self.shared,
            path: self.path,
        })
    }
}

/// Running workers. Dropping the pool without calling
/// [`shutdown`](Self::shutdown) leaves the threads running.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
    path: PathBuf,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn metrics(&self) -> Arc<ConnectionMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    pub fn context(&self) -> Arc<BrokerContext> {
        Arc::clone(&self.shared.ctx)
    }

    /// Raise the shutdown flag, wait for every worker, remove the socket.
    ///
    /// Sessions still open are told `-SHUTDOWN` and committed at their next
    /// read timeout.
    pub fn shutdown(self) {
        info!("Stopping worker pool");
        self.shared.shutdown.store(true, Ordering::SeqCst);

        for handle in self.workers {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(worker = %name, "Worker thread panicked");
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Could not remove socket file");
        }
        info!("Worker pool stopped");
    }
}

fn worker_loop(id: usize, listener: &Mutex<UnixListener>, shared: &Shared, accept_timeout: Duration) {
    debug!(worker = id, "Worker started");
    while !shared.shutdown.load(Ordering::SeqCst) {
        match accept(listener, accept_timeout, &shared.shutdown) {
            Ok(Some(stream)) => {
                let served = panic::catch_unwind(AssertUnwindSafe(|| serve_connection(stream, shared)));
                if served.is_err() {
                    error!(worker = id, "Connection handler panicked");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(worker = id, error = %e, "Failed to accept connection");
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
    debug!(worker = id, "Worker stopped");
}

/// Wait up to `timeout` for a connection while holding the listener.
///
/// Returns `None` when the wait ran out or shutdown was requested.
fn accept(
    listener: &Mutex<UnixListener>,
    timeout: Duration,
    shutdown: &AtomicBool,
) -> io::Result<Option<UnixStream>> {
    let listener = match listener.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let deadline = Instant::now() + timeout;

    loop {
        match listener.accept() {
            Ok((stream, _)) => return Ok(Some(stream)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if shutdown.load(Ordering::SeqCst) || Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
