//! Lookups against the host account database.

use nix::unistd::{Gid, Group, User};
use tracing::warn;

use super::{GroupEntry, UserDirectory, UserEntry};

/// Resolves users and groups through the system NSS database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDirectory;

impl SystemDirectory {
    pub fn new() -> Self {
        Self
    }
}

fn to_group_entry(group: Group) -> GroupEntry {
    GroupEntry {
        name: group.name,
        gid: group.gid.as_raw(),
        members: group.mem,
    }
}

impl UserDirectory for SystemDirectory {
    fn user(&self, name: &str) -> Option<UserEntry> {
        match User::from_name(name) {
            Ok(found) => found.map(|user| UserEntry {
                name: user.name,
                uid: user.uid.as_raw(),
                gid: user.gid.as_raw(),
                home: user.dir,
            }),
            Err(e) => {
                warn!(user = %name, error = %e, "User lookup failed");
                None
            }
        }
    }

    fn group(&self, name: &str) -> Option<GroupEntry> {
        match Group::from_name(name) {
            Ok(found) => found.map(to_group_entry),
            Err(e) => {
                warn!(group = %name, error = %e, "Group lookup failed");
                None
            }
        }
    }

    fn group_by_gid(&self, gid: u32) -> Option<GroupEntry> {
        match Group::from_gid(Gid::from_raw(gid)) {
            Ok(found) => found.map(to_group_entry),
            Err(e) => {
                warn!(gid = gid, error = %e, "Group lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_user_exists() {
        let root = SystemDirectory::new().user("root").unwrap();
        assert_eq!(root.uid, 0);
    }

    #[test]
    fn test_unknown_user() {
        assert!(SystemDirectory::new()
            .user("no-such-user-authd-test")
            .is_none());
    }

    #[test]
    fn test_group_by_gid_zero() {
        let group = SystemDirectory::new().group_by_gid(0).unwrap();
        assert_eq!(group.gid, 0);
    }
}
