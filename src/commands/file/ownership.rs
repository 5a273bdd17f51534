//! Owner and mode resolution for installed files and created directories.

use std::fs::{DirBuilder, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{fchown, DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use nix::libc;
use tracing::warn;

use crate::accounts::UserDirectory;
use crate::error::{CommandResult, Failure};
use crate::policy::FileAttributes;

/// Numeric owner for a rule's attributes.
///
/// A named user supplies both uid and primary gid; an unknown user falls back
/// to root. A named group overrides the gid and must exist.
pub(crate) fn resolve_owner(
    directory: &dyn UserDirectory,
    attributes: &FileAttributes,
) -> CommandResult<(u32, u32)> {
    let (mut uid, mut gid) = (0, 0);

    if let Some(user) = &attributes.user {
        match directory.user(user) {
            Some(entry) => {
                uid = entry.uid;
                gid = entry.gid;
            }
            None => warn!(user = %user, "Unknown user in fileop, using root"),
        }
    }

    if let Some(group) = &attributes.group {
        match directory.group(group) {
            Some(entry) => gid = entry.gid,
            None => {
                warn!(group = %group, "Unknown group in fileop");
                return Err(Failure::not_found(format!("Unknown group: {}", group)));
            }
        }
    }

    Ok((uid, gid))
}

/// Give every class that may read or write a directory the right to enter it.
pub(crate) fn directory_mode(perms: u32) -> u32 {
    let mut mode = perms;
    if mode & 0o700 != 0 {
        mode |= 0o100;
    }
    if mode & 0o070 != 0 {
        mode |= 0o010;
    }
    if mode & 0o007 != 0 {
        mode |= 0o001;
    }
    mode
}

/// Open an existing directory without following a final symlink.
fn open_directory(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY | libc::O_NOFOLLOW)
        .open(path)
}

/// The step at which [`create_owned_dir`] gave up.
#[derive(Debug)]
pub enum DirectoryError {
    Create(io::Error),
    Open(io::Error),
    Chown(io::Error),
    Chmod(io::Error),
}

impl DirectoryError {
    /// The client-facing failure for this step.
    pub fn into_failure(self) -> Failure {
        match self {
            DirectoryError::Create(_) | DirectoryError::Open(_) => {
                Failure::command_failed("Could not create directory")
            }
            DirectoryError::Chown(_) => Failure::command_failed("Could not set ownership"),
            DirectoryError::Chmod(_) => Failure::command_failed("Could not set permissions"),
        }
    }

    pub fn io_error(&self) -> &io::Error {
        match self {
            DirectoryError::Create(e)
            | DirectoryError::Open(e)
            | DirectoryError::Chown(e)
            | DirectoryError::Chmod(e) => e,
        }
    }
}

/// Create `path` if missing, then set its owner and mode through a descriptor.
///
/// New directories start out private to the daemon. The directory is reopened
/// with `O_NOFOLLOW` so the ownership change cannot be redirected through a
/// symlink put in its place.
pub fn create_owned_dir(path: &Path, uid: u32, gid: u32, mode: u32) -> Result<(), DirectoryError> {
    match DirBuilder::new().mode(0o700).create(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            warn!(path = %path.display(), "Directory already exists");
        }
        Err(e) => return Err(DirectoryError::Create(e)),
    }

    let dir = open_directory(path).map_err(DirectoryError::Open)?;
    fchown(&dir, Some(uid), Some(gid)).map_err(DirectoryError::Chown)?;
    dir.set_permissions(Permissions::from_mode(mode))
        .map_err(DirectoryError::Chmod)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::StaticDirectory;
    use crate::error::ErrorCode;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    fn directory() -> StaticDirectory {
        StaticDirectory::new()
            .with_user("www", 33, 34, "/var/www")
            .with_group("web", 80, &[])
    }

    fn attrs(user: Option<&str>, group: Option<&str>) -> FileAttributes {
        FileAttributes {
            user: user.map(String::from),
            group: group.map(String::from),
            perms: None,
        }
    }

    fn own_ids() -> (u32, u32) {
        (
            nix::unistd::geteuid().as_raw(),
            nix::unistd::getegid().as_raw(),
        )
    }

    #[test]
    fn test_user_and_group() {
        let dir = directory();
        assert_eq!(resolve_owner(&dir, &attrs(None, None)).unwrap(), (0, 0));
        assert_eq!(
            resolve_owner(&dir, &attrs(Some("www"), None)).unwrap(),
            (33, 34)
        );
        assert_eq!(
            resolve_owner(&dir, &attrs(Some("www"), Some("web"))).unwrap(),
            (33, 80)
        );
    }

    #[test]
    fn test_unknown_user_degrades_to_root() {
        let dir = directory();
        assert_eq!(
            resolve_owner(&dir, &attrs(Some("ghost"), None)).unwrap(),
            (0, 0)
        );
    }

    #[test]
    fn test_unknown_group_fails() {
        let dir = directory();
        let failure = resolve_owner(&dir, &attrs(None, Some("ghosts"))).unwrap_err();
        assert_eq!(failure.code, ErrorCode::NotFound);
        assert_eq!(failure.message, "Unknown group: ghosts");
    }

    #[test]
    fn test_directory_mode() {
        assert_eq!(directory_mode(0o640), 0o750);
        assert_eq!(directory_mode(0o644), 0o755);
        assert_eq!(directory_mode(0o600), 0o700);
        assert_eq!(directory_mode(0o000), 0o000);
    }

    #[test]
    fn test_create_owned_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("made");
        let (uid, gid) = own_ids();

        create_owned_dir(&path, uid, gid, 0o751).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.is_dir());
        assert_eq!(metadata.mode() & 0o7777, 0o751);

        // An existing directory is adjusted rather than refused.
        create_owned_dir(&path, uid, gid, 0o700).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().mode() & 0o7777, 0o700);
    }

    #[test]
    fn test_create_owned_dir_refuses_symlink() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("target")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("target"), temp.path().join("link"))
            .unwrap();
        let (uid, gid) = own_ids();

        let err = create_owned_dir(&temp.path().join("link"), uid, gid, 0o755).unwrap_err();
        assert!(matches!(err, DirectoryError::Open(_)));
        assert_eq!(err.into_failure().message, "Could not create directory");
    }

    #[test]
    fn test_create_owned_dir_missing_parent() {
        let temp = TempDir::new().unwrap();
        let (uid, gid) = own_ids();
        let err = create_owned_dir(&temp.path().join("a/b"), uid, gid, 0o755).unwrap_err();
        assert!(matches!(err, DirectoryError::Create(_)));
    }
}
