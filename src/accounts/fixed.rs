//! In-memory account table.

use std::collections::HashMap;
use std::path::PathBuf;

use super::{GroupEntry, UserDirectory, UserEntry};

/// A fixed set of users and groups, used by tests and by deployments that
/// want the broker to see a curated account list.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    users: HashMap<String, UserEntry>,
    groups: HashMap<String, GroupEntry>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user. Returns `self` so tables can be built inline.
    pub fn with_user(mut self, name: &str, uid: u32, gid: u32, home: impl Into<PathBuf>) -> Self {
        self.users.insert(
            name.to_string(),
            UserEntry {
                name: name.to_string(),
                uid,
                gid,
                home: home.into(),
            },
        );
        self
    }

    /// Add a group with its member list.
    pub fn with_group(mut self, name: &str, gid: u32, members: &[&str]) -> Self {
        self.groups.insert(
            name.to_string(),
            GroupEntry {
                name: name.to_string(),
                gid,
                members: members.iter().map(|m| m.to_string()).collect(),
            },
        );
        self
    }
}

impl UserDirectory for StaticDirectory {
    fn user(&self, name: &str) -> Option<UserEntry> {
        self.users.get(name).cloned()
    }

    fn group(&self, name: &str) -> Option<GroupEntry> {
        self.groups.get(name).cloned()
    }

    fn group_by_gid(&self, gid: u32) -> Option<GroupEntry> {
        self.groups.values().find(|g| g.gid == gid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_gid() {
        let dir = StaticDirectory::new()
            .with_user("alice", 1000, 1000, "/home/alice")
            .with_group("alice", 1000, &[])
            .with_group("paneluser", 2000, &["alice"]);

        assert_eq!(dir.user("alice").unwrap().home, PathBuf::from("/home/alice"));
        assert_eq!(dir.group_by_gid(1000).unwrap().name, "alice");
        assert!(dir.group("paneluser").unwrap().has_member("alice"));
        assert!(dir.user("bob").is_none());
    }
}
