//! User and group lookups.
//!
//! The broker never reads `/etc/passwd` directly; everything goes through
//! [`UserDirectory`] so policy decisions can be tested without real accounts.

mod fixed;
mod system;

use std::path::PathBuf;

pub use fixed::StaticDirectory;
pub use system::SystemDirectory;

/// A resolved user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: u32,
    /// Primary group.
    pub gid: u32,
    pub home: PathBuf,
}

/// A resolved group and its explicitly listed members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

impl GroupEntry {
    pub fn has_member(&self, user: &str) -> bool {
        self.members.iter().any(|m| m == user)
    }
}

/// Source of user and group records.
pub trait UserDirectory: Send + Sync {
    fn user(&self, name: &str) -> Option<UserEntry>;
    fn group(&self, name: &str) -> Option<GroupEntry>;
    fn group_by_gid(&self, gid: u32) -> Option<GroupEntry>;
}
