//! `getobject`: hand a module the contents of a file it declares.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::Path;

use nix::libc;
use tracing::{info, warn};

use crate::error::{CommandResult, Failure};

use super::super::handler::CommandHandler;

impl CommandHandler {
    pub(crate) fn get_object(&self, alias: &str) -> CommandResult<Vec<u8>> {
        let path = self
            .ctx
            .engine
            .resolve_object(&self.module, alias)
            .map_err(|denial| Failure::policy(denial.to_string()))?;

        let data = read_object(&path)?;
        info!(module = %self.module, alias = %alias, bytes = data.len(), "Sending object");
        Ok(data)
    }
}

/// Read a regular, singly-linked file without following symlinks.
///
/// The file is checked by path, opened, and checked again by descriptor; the
/// read goes ahead only if both checks saw the same inode.
fn read_object(path: &Path) -> CommandResult<Vec<u8>> {
    let before = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Failure::not_found(format!(
                "Could not find file: {}",
                path.display()
            )));
        }
        Err(e) => return Err(refuse(path, "Could not inspect file", e)),
    };
    if !before.file_type().is_file() {
        warn!(path = %path.display(), "Object is not a regular file");
        return Err(Failure::command_failed("Object is not a regular file"));
    }
    if before.nlink() != 1 {
        warn!(path = %path.display(), links = before.nlink(), "Object has extra hard links");
        return Err(Failure::command_failed("Object has multiple hard links"));
    }

    let mut file = open_nofollow(path).map_err(|e| refuse(path, "Could not open file", e))?;
    let after = file
        .metadata()
        .map_err(|e| refuse(path, "Could not inspect file", e))?;
    if after.dev() != before.dev() || after.ino() != before.ino() {
        warn!(path = %path.display(), "Object replaced while opening");
        return Err(Failure::command_failed("Object changed while opening"));
    }

    let mut data = Vec::with_capacity(after.len() as usize);
    file.read_to_end(&mut data)
        .map_err(|e| refuse(path, "Could not read file", e))?;
    Ok(data)
}

fn open_nofollow(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
}

fn refuse(path: &Path, message: &str, error: io::Error) -> Failure {
    warn!(path = %path.display(), error = %error, "{}", message);
    Failure::command_failed(message)
}
