//! `deletefile` and `deletedir`.

use std::os::unix::fs::MetadataExt;

use tracing::{error, info};

use crate::error::{CommandResult, Failure};

use super::super::handler::CommandHandler;
use super::{trim_trailing_slash, DIRECTORY_DENIED, FILE_DENIED};

impl CommandHandler {
    pub(crate) fn delete_file(&self, path: &str) -> CommandResult {
        self.ctx
            .engine
            .authorize_delete(&self.module, path)
            .map_err(|denial| Failure::policy(format!("{}{}", FILE_DENIED, denial)))?;

        info!(module = %self.module, path = %path, "Deleting file");
        let args = self.transaction_args(&[path]);
        self.helper("remove-single-file", args)
    }

    /// Remove a directory the module installs into.
    ///
    /// When the matching rule names an owner, the directory on disk must
    /// still carry that owner.
    pub(crate) fn delete_dir(&self, path: &str) -> CommandResult {
        let path = trim_trailing_slash(path);
        let attributes = self
            .ctx
            .engine
            .authorize_destination(&self.module, None, path)
            .map_err(|denial| Failure::policy(format!("{}{}", DIRECTORY_DENIED, denial)))?;

        if attributes.user.is_some() || attributes.group.is_some() {
            let directory = self.ctx.directory.as_ref();
            let metadata = std::fs::symlink_metadata(path).ok();
            let owner = metadata.as_ref().map(|m| (m.uid(), m.gid()));

            let user_ok = attributes.user.as_ref().map_or(true, |user| {
                directory.user(user).map(|u| u.uid) == owner.map(|(uid, _)| uid)
            });
            let group_ok = attributes.group.as_ref().map_or(true, |group| {
                directory.group(group).map(|g| g.gid) == owner.map(|(_, gid)| gid)
            });

            if !(user_ok && group_ok) {
                error!(module = %self.module, path = %path, "Directory does not match ownership policy");
                return Err(Failure::policy("Destination directory ownership mismatch"));
            }
        }

        info!(module = %self.module, path = %path, "Deleting directory");
        let args = self.transaction_args(&[path]);
        self.helper("remove-directory", args)
    }
}
