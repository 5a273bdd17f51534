//! Authorization decisions over module policies.

use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::accounts::UserDirectory;
use crate::validation::has_parent_component;

use super::document::{FileAttributes, ModulePolicy};
use super::store::PolicyStore;

/// Why a request was refused. The display text is sent to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyDenial {
    #[error("Could not find module")]
    ModuleNotFound,

    #[error("Filename starts with a slash")]
    AbsoluteName,

    #[error("Filename contains relative path elements")]
    RelativeElements,

    #[error("Source file does not exist")]
    SourceMissing,

    #[error("Source file is not a regular file")]
    SourceNotRegular,

    #[error("File owner mismatch (not {user})")]
    OwnerMismatch { user: String },

    #[error("File group mismatch (not {group})")]
    GroupMismatch { group: String },

    #[error("File is world-writable")]
    WorldWritable,

    #[error("Path contains relative path elements")]
    PathTraversal,

    #[error("No matching fileop found in module.xml")]
    NoSourceRule,

    #[error("No matching destination path found in fileop")]
    NoDestinationRule,

    #[error("No matching destination path found in any fileop for the module")]
    NoDeleteRule,

    #[error("Service not defined in module.xml")]
    ServiceNotDefined,

    #[error("Script not defined in module.xml")]
    ScriptNotDefined,

    #[error("Script may not be run as root")]
    RootNotAllowed,

    #[error("Command or command class not defined in module.xml")]
    CommandNotDefined,

    #[error("Object not defined")]
    ObjectNotDefined,
}

/// Decides whether a module may perform an operation.
pub struct PolicyEngine {
    store: Arc<PolicyStore>,
    directory: Arc<dyn UserDirectory>,
    staging_root: PathBuf,
    staging_user: String,
    staging_group: String,
}

impl PolicyEngine {
    pub fn new(
        store: Arc<PolicyStore>,
        directory: Arc<dyn UserDirectory>,
        staging_root: impl Into<PathBuf>,
        staging_user: &str,
        staging_group: &str,
    ) -> Self {
        Self {
            store,
            directory,
            staging_root: staging_root.into(),
            staging_user: staging_user.to_string(),
            staging_group: staging_group.to_string(),
        }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    fn policy(&self, module: &str) -> Result<Arc<ModulePolicy>, PolicyDenial> {
        self.store.get(module).ok_or(PolicyDenial::ModuleNotFound)
    }

    /// Locate a staged source file and check that it may be installed.
    pub fn resolve_source_path(&self, module: &str, name: &str) -> Result<PathBuf, PolicyDenial> {
        if name.starts_with('/') {
            return Err(PolicyDenial::AbsoluteName);
        }
        if name.contains("..") {
            return Err(PolicyDenial::RelativeElements);
        }

        let policy = self.policy(module)?;
        if !policy.fileops.iter().any(|rule| rule.source.matches(name)) {
            return Err(PolicyDenial::NoSourceRule);
        }

        let path = self.staging_root.join(module).join(name);
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(_) => return Err(PolicyDenial::SourceMissing),
        };
        if !metadata.file_type().is_file() {
            return Err(PolicyDenial::SourceNotRegular);
        }

        let owner = self.directory.user(&self.staging_user).map(|u| u.uid);
        if owner != Some(metadata.uid()) {
            debug!(path = %path.display(), uid = metadata.uid(), "Staged file has wrong owner");
            return Err(PolicyDenial::OwnerMismatch {
                user: self.staging_user.clone(),
            });
        }
        let group = self.directory.group(&self.staging_group).map(|g| g.gid);
        if group != Some(metadata.gid()) {
            debug!(path = %path.display(), gid = metadata.gid(), "Staged file has wrong group");
            return Err(PolicyDenial::GroupMismatch {
                group: self.staging_group.clone(),
            });
        }
        if metadata.mode() & 0o003 != 0 {
            return Err(PolicyDenial::WorldWritable);
        }

        Ok(path)
    }

    /// Find the attributes for a destination directory.
    ///
    /// With a source name, the rule must also match it.
    pub fn authorize_destination(
        &self,
        module: &str,
        source: Option<&str>,
        dest: &str,
    ) -> Result<FileAttributes, PolicyDenial> {
        if has_parent_component(dest) {
            return Err(PolicyDenial::PathTraversal);
        }
        let policy = self.policy(module)?;
        policy
            .fileops
            .iter()
            .find(|rule| {
                source.map_or(true, |name| rule.source.matches(name))
                    && rule.dest.matches_destination(dest)
            })
            .map(|rule| rule.attributes.clone())
            .ok_or(PolicyDenial::NoDestinationRule)
    }

    /// Check that a path lies inside a directory some rule installs into.
    pub fn authorize_delete(&self, module: &str, path: &str) -> Result<(), PolicyDenial> {
        if has_parent_component(path) {
            return Err(PolicyDenial::PathTraversal);
        }
        let policy = self.policy(module)?;
        if policy.fileops.iter().any(|rule| rule.contents.matches(path)) {
            Ok(())
        } else {
            Err(PolicyDenial::NoDeleteRule)
        }
    }

    pub fn authorize_service(&self, module: &str, service: &str) -> Result<(), PolicyDenial> {
        let policy = self.policy(module)?;
        if policy.services.contains(service) {
            Ok(())
        } else {
            Err(PolicyDenial::ServiceNotDefined)
        }
    }

    /// Returns the user the script must run as.
    pub fn authorize_script(
        &self,
        module: &str,
        script: &str,
        requested_user: &str,
    ) -> Result<String, PolicyDenial> {
        let policy = self.policy(module)?;
        let entry = policy
            .scripts
            .get(script)
            .ok_or(PolicyDenial::ScriptNotDefined)?;

        let user = entry
            .as_user
            .clone()
            .unwrap_or_else(|| requested_user.to_string());
        if entry.as_root == Some(false) && (requested_user == "root" || user == "root") {
            return Err(PolicyDenial::RootNotAllowed);
        }
        Ok(user)
    }

    pub fn authorize_command(
        &self,
        module: &str,
        command: &str,
        class: &str,
    ) -> Result<(), PolicyDenial> {
        let policy = self.policy(module)?;
        if policy.commands.contains(command) || policy.command_classes.contains(class) {
            Ok(())
        } else {
            Err(PolicyDenial::CommandNotDefined)
        }
    }

    /// Map an object alias to the file it stands for.
    pub fn resolve_object(&self, module: &str, alias: &str) -> Result<PathBuf, PolicyDenial> {
        let policy = self.policy(module)?;
        policy
            .objects
            .get(alias)
            .cloned()
            .ok_or(PolicyDenial::ObjectNotDefined)
    }
}

/// Join a destination directory and the base name of a source file.
pub fn compose_destination_path(dir: &str, source: &str) -> String {
    let base = source.rsplit('/').next().unwrap_or(source);
    format!("{}/{}", dir.trim_end_matches('/'), base)
}
