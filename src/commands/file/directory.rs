//! `makedir` and `makeuserdir`.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{CommandResult, Failure};

use super::super::handler::CommandHandler;
use super::home::{create_below, home_target, refuse_symlinks, reject_parent_reference};
use super::ownership::{create_owned_dir, directory_mode, resolve_owner};
use super::{trim_trailing_slash, DIRECTORY_DENIED};

const DEFAULT_DIR_MODE: u32 = 0o600;

impl CommandHandler {
    /// Create a directory named by a fileop destination.
    pub(crate) fn make_dir(&self, path: &str) -> CommandResult {
        let path = trim_trailing_slash(path);
        let attributes = self
            .ctx
            .engine
            .authorize_destination(&self.module, None, path)
            .map_err(|denial| Failure::policy(format!("{}{}", DIRECTORY_DENIED, denial)))?;

        let (uid, gid) = resolve_owner(self.ctx.directory.as_ref(), &attributes)?;
        let mode = attributes.perms.map_or(DEFAULT_DIR_MODE, directory_mode);

        info!(
            module = %self.module,
            path = %path,
            uid = uid,
            gid = gid,
            mode = format!("{:o}", mode),
            "Creating directory"
        );
        create_owned_dir(Path::new(path), uid, gid, mode).map_err(|e| {
            warn!(path = %path, error = %e.io_error(), "Directory creation failed");
            e.into_failure()
        })
    }

    /// Create a directory path below a panel user's home.
    pub(crate) fn make_user_dir(&self, path: &str, user: &str, mode: u32) -> CommandResult {
        reject_parent_reference(path)?;
        let entry = self.panel_user(user)?;
        let target = home_target(&entry.home, path)?;
        refuse_symlinks(&entry.home, &target)?;
        create_below(&entry.home, &target, &entry, mode)?;

        info!(module = %self.module, user = %user, path = %target.display(), "User directory ready");
        Ok(())
    }
}
