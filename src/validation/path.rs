//! Path checks applied before touching the filesystem.

use std::io;
use std::path::{Component, Path, PathBuf};

/// True when the text contains `..` anywhere.
pub fn has_parent_reference(path: &str) -> bool {
    path.contains("..")
}

/// True when any component of the path is `..`.
///
/// Names that merely contain two dots, like `a..b`, are not traversal.
pub fn has_parent_component(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|component| component == Component::ParentDir)
}

/// Find the first existing symlink at or below `base` on the way to `target`.
///
/// `target` must lie under `base`. Components that do not exist yet end the
/// walk; they will be created by the caller.
pub fn first_symlink_below(base: &Path, target: &Path) -> io::Result<Option<PathBuf>> {
    let relative = match target.strip_prefix(base) {
        Ok(rel) => rel,
        Err(_) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not below {}", target.display(), base.display()),
            ))
        }
    };

    let mut current = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => current.push(part),
            Component::CurDir => continue,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unexpected component in {}", target.display()),
                ))
            }
        }
        match std::fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => return Ok(Some(current)),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}
