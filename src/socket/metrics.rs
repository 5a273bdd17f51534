//! Connection and command counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::info;

/// Counters shared by all workers.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    connections_accepted: AtomicU64,
    active_connections: AtomicUsize,
    commands_ok: AtomicU64,
    commands_failed: AtomicU64,
    rollbacks: AtomicU64,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_command(&self, success: bool) {
        if success {
            self.commands_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections_accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn commands_ok(&self) -> u64 {
        self.commands_ok.load(Ordering::Relaxed)
    }

    pub fn commands_failed(&self) -> u64 {
        self.commands_failed.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Write the counters to the log.
    pub fn log_summary(&self) {
        info!(
            connections = self.connections_accepted(),
            active = self.active(),
            commands_ok = self.commands_ok(),
            commands_failed = self.commands_failed(),
            rollbacks = self.rollbacks(),
            "Connection metrics"
        );
    }
}
