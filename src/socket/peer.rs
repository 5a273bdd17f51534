//! Credentials of the process on the other end of a connection.

use std::os::fd::AsFd;

use crate::error::DaemonError;

/// Who connected, as reported by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerInfo {
    pub uid: u32,
    pub gid: u32,
    /// Zero when unknown.
    pub pid: i32,
}

/// Read `SO_PEERCRED` from a connected Unix socket.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn peer_credentials<S: AsFd>(stream: &S) -> Result<PeerInfo, DaemonError> {
    use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};

    let creds = getsockopt(stream, PeerCredentials).map_err(|e| DaemonError::Socket {
        message: format!("Failed to get peer credentials: {}", e),
    })?;
    Ok(PeerInfo {
        uid: creds.uid(),
        gid: creds.gid(),
        pid: creds.pid(),
    })
}

/// Peer uid and gid through `getpeereid`; the pid is not available.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn peer_credentials<S: AsFd>(stream: &S) -> Result<PeerInfo, DaemonError> {
    use std::os::fd::AsRawFd;

    let (uid, gid) = nix::unistd::getpeereid(stream.as_fd().as_raw_fd()).map_err(|e| {
        DaemonError::Socket {
            message: format!("Failed to get peer credentials: {}", e),
        }
    })?;
    Ok(PeerInfo {
        uid: uid.as_raw(),
        gid: gid.as_raw(),
        pid: 0,
    })
}
