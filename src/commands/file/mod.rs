//! File and directory operations.
//!
//! Installs and deletions are handed to helper scripts under the session's
//! transaction. Directory creation is done in-process so ownership and mode
//! can be applied through the directory's own descriptor.

mod directory;
mod home;
mod install;
mod ownership;
mod remove;

pub use ownership::{create_owned_dir, DirectoryError};

const SOURCE_DENIED: &str = "Source file name does not match policy: ";
const FILE_DENIED: &str = "Destination file name does not match policy: ";
const DIRECTORY_DENIED: &str = "Destination directory does not match policy: ";

/// Drop one trailing `/` from a client-supplied directory path.
pub(crate) fn trim_trailing_slash(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_trailing_slash() {
        assert_eq!(trim_trailing_slash("/etc/app/"), "/etc/app");
        assert_eq!(trim_trailing_slash("/etc/app"), "/etc/app");
        assert_eq!(trim_trailing_slash("/etc//"), "/etc/");
        assert_eq!(trim_trailing_slash(""), "");
    }
}
