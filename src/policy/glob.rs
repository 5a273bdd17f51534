//! Shell-style path patterns used by module policies.

use std::fmt;

use glob::{MatchOptions, Pattern};

use crate::error::{DaemonError, DocumentErrorKind};

/// `*` crosses `/`, matching is case-sensitive and anchored at both ends.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled pattern together with the text it was written as.
#[derive(Clone)]
pub struct PathGlob {
    text: String,
    pattern: Pattern,
}

impl PathGlob {
    /// Compile a pattern. Invalid patterns are a document error.
    pub fn new(text: &str) -> Result<Self, DaemonError> {
        let pattern = Pattern::new(text).map_err(|e| DaemonError::Document {
            kind: DocumentErrorKind::InvalidPattern {
                pattern: text.to_string(),
                message: e.to_string(),
            },
        })?;
        Ok(Self {
            text: text.to_string(),
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whole-string match.
    pub fn matches(&self, candidate: &str) -> bool {
        self.pattern.matches_with(candidate, MATCH_OPTIONS)
    }

    /// Match a destination directory.
    ///
    /// A pattern such as `/etc/app/*` names the contents of `/etc/app`, so the
    /// directory itself is accepted when written with a trailing slash.
    pub fn matches_destination(&self, dest: &str) -> bool {
        if self.matches(dest) {
            return true;
        }
        self.text.len() > 2 && self.text.ends_with("/*") && self.matches(&format!("{}/", dest))
    }

    /// The pattern covering everything below the directories this pattern names.
    pub fn contents(&self) -> Result<Self, DaemonError> {
        if self.text.ends_with('*') {
            Ok(self.clone())
        } else if self.text.ends_with('/') {
            Self::new(&format!("{}*", self.text))
        } else {
            Self::new(&format!("{}/*", self.text))
        }
    }
}

impl fmt::Debug for PathGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathGlob").field(&self.text).finish()
    }
}

impl fmt::Display for PathGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(text: &str) -> PathGlob {
        PathGlob::new(text).unwrap()
    }

    #[test]
    fn test_star_crosses_separator() {
        assert!(glob("/etc/app/*").matches("/etc/app/sub/file.conf"));
        assert!(glob("*.conf").matches("nested/dir/x.conf"));
    }

    #[test]
    fn test_whole_string_and_case() {
        assert!(!glob("*.conf").matches("x.conf.bak"));
        assert!(!glob("*.conf").matches("X.CONF"));
        assert!(glob("file?.[ch]").matches("file1.c"));
    }

    #[test]
    fn test_destination_trailing_slash_rule() {
        let g = glob("/etc/app/*");
        assert!(g.matches_destination("/etc/app"));
        assert!(g.matches_destination("/etc/app/conf.d"));
        assert!(!g.matches_destination("/etc/other"));
        assert!(!glob("/*").matches_destination(""));
    }

    #[test]
    fn test_contents_normalization() {
        assert_eq!(glob("/etc/app/*").contents().unwrap().as_str(), "/etc/app/*");
        assert_eq!(glob("/etc/app/").contents().unwrap().as_str(), "/etc/app/*");
        assert_eq!(glob("/etc/app").contents().unwrap().as_str(), "/etc/app/*");
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PathGlob::new("/etc/[abc").unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Document {
                kind: DocumentErrorKind::InvalidPattern { .. }
            }
        ));
    }
}
