//! `installfile` and `installuserfile`.

use tracing::info;

use crate::error::{CommandResult, Failure};
use crate::policy::compose_destination_path;

use super::super::handler::CommandHandler;
use super::home::{create_below, home_target, refuse_symlinks};
use super::ownership::resolve_owner;
use super::{trim_trailing_slash, FILE_DENIED, SOURCE_DENIED};

const DEFAULT_FILE_MODE: u32 = 0o640;
const USER_FILE_MODE: &str = "640";
const USER_DIR_MODE: u32 = 0o750;

impl CommandHandler {
    /// Copy a staged file into a policy-approved directory.
    pub(crate) fn install_file(&self, file: &str, dest_dir: &str) -> CommandResult {
        let dest_dir = trim_trailing_slash(dest_dir);
        let engine = &self.ctx.engine;

        let source = engine
            .resolve_source_path(&self.module, file)
            .map_err(|denial| Failure::policy(format!("{}{}", SOURCE_DENIED, denial)))?;
        let attributes = engine
            .authorize_destination(&self.module, Some(file), dest_dir)
            .map_err(|denial| Failure::policy(format!("{}{}", FILE_DENIED, denial)))?;

        let (uid, gid) = resolve_owner(self.ctx.directory.as_ref(), &attributes)?;
        let mode = attributes.perms.unwrap_or(DEFAULT_FILE_MODE);
        let dest = compose_destination_path(dest_dir, file);

        info!(
            module = %self.module,
            source = %source.display(),
            dest = %dest,
            uid = uid,
            gid = gid,
            mode = format!("{:o}", mode),
            "Installing file"
        );

        let args = self.transaction_args(&[
            &source.to_string_lossy(),
            &dest,
            &uid.to_string(),
            &gid.to_string(),
            &format!("{:o}", mode),
        ]);
        self.helper("install-single-file", args)
    }

    /// Copy a staged file into a panel user's home directory.
    pub(crate) fn install_user_file(&self, file: &str, dest_path: &str, user: &str) -> CommandResult {
        let source = self
            .ctx
            .engine
            .resolve_source_path(&self.module, file)
            .map_err(|denial| Failure::policy(format!("{}{}", SOURCE_DENIED, denial)))?;

        let entry = self.panel_user(user)?;
        let target_dir = home_target(&entry.home, dest_path)?;
        refuse_symlinks(&entry.home, &target_dir)?;
        create_below(&entry.home, &target_dir, &entry, USER_DIR_MODE)?;

        let dest = compose_destination_path(&target_dir.to_string_lossy(), file);
        info!(
            module = %self.module,
            user = %user,
            source = %source.display(),
            dest = %dest,
            "Installing user file"
        );

        let args = self.transaction_args(&[
            &source.to_string_lossy(),
            &dest,
            &entry.uid.to_string(),
            &entry.gid.to_string(),
            USER_FILE_MODE,
        ]);
        self.helper("install-single-file", args)
    }
}
