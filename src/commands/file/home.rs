//! Targets inside a panel user's home directory.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use crate::accounts::UserEntry;
use crate::error::{CommandResult, Failure};
use crate::validation::{first_symlink_below, has_parent_reference};

use super::super::handler::CommandHandler;
use super::ownership::create_owned_dir;

impl CommandHandler {
    /// Look up `user` and check that they belong to the panel users group.
    pub(super) fn panel_user(&self, user: &str) -> CommandResult<UserEntry> {
        let directory = self.ctx.directory.as_ref();
        let group_name = &self.ctx.panel_users_group;

        let panel_group = directory
            .group(group_name)
            .ok_or_else(|| Failure::not_found(format!("The {} group was not found", group_name)))?;
        let entry = directory
            .user(user)
            .ok_or_else(|| Failure::not_found("The user was not found"))?;
        if directory.group_by_gid(entry.gid).is_none() {
            return Err(Failure::not_found("The user's primary group was not found"));
        }
        if !panel_group.has_member(user) {
            warn!(module = %self.module, user = %user, "User outside panel group");
            return Err(Failure::policy(format!(
                "The user is not a member of group {}",
                group_name
            )));
        }
        Ok(entry)
    }
}

/// Resolve a client path against a home directory.
///
/// The result always lies below `home`: parent references are refused and a
/// leading `/` is treated as relative to the home directory.
pub(super) fn home_target(home: &Path, path: &str) -> CommandResult<PathBuf> {
    reject_parent_reference(path)?;
    Ok(home.join(path.trim_start_matches('/')))
}

pub(super) fn reject_parent_reference(path: &str) -> CommandResult {
    if has_parent_reference(path) {
        return Err(Failure::policy(
            "Destination directory contains illegal characters",
        ));
    }
    Ok(())
}

/// Refuse targets that would pass through an existing symlink below `home`.
pub(super) fn refuse_symlinks(home: &Path, target: &Path) -> CommandResult {
    match first_symlink_below(home, target) {
        Ok(None) => Ok(()),
        Ok(Some(link)) => {
            warn!(link = %link.display(), "Symlink inside user directory");
            Err(Failure::policy("Destination path contains a symbolic link"))
        }
        Err(e) => {
            warn!(target = %target.display(), error = %e, "Could not inspect user directory");
            Err(Failure::command_failed("Could not create directory"))
        }
    }
}

/// Create every missing directory between `home` and `target`.
///
/// Existing directories are left untouched; new ones are owned by the user.
pub(super) fn create_below(home: &Path, target: &Path, user: &UserEntry, mode: u32) -> CommandResult {
    let relative = target
        .strip_prefix(home)
        .map_err(|_| Failure::policy("Destination directory contains illegal characters"))?;

    let mut current = home.to_path_buf();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        current.push(part);

        match std::fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                return Err(Failure::policy("Destination path contains a symbolic link"));
            }
            Ok(metadata) if metadata.is_dir() => continue,
            Ok(_) => return Err(Failure::command_failed("Could not create directory")),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(_) => return Err(Failure::command_failed("Could not create directory")),
        }

        create_owned_dir(&current, user.uid, user.gid, mode).map_err(|e| {
            warn!(path = %current.display(), error = %e.io_error(), "Directory creation failed");
            e.into_failure()
        })?;
        info!(path = %current.display(), user = %user.name, mode = format!("{:o}", mode), "Created user directory");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_home_target() {
        let home = Path::new("/home/alice");
        assert_eq!(
            home_target(home, "/public_html/img").unwrap(),
            PathBuf::from("/home/alice/public_html/img")
        );
        assert_eq!(
            home_target(home, "mail").unwrap(),
            PathBuf::from("/home/alice/mail")
        );
        let failure = home_target(home, "../bob").unwrap_err();
        assert_eq!(failure.code, ErrorCode::Policy);
        assert_eq!(
            failure.message,
            "Destination directory contains illegal characters"
        );
    }
}
