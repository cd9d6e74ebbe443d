//! Small newtypes shared across the crate.

use std::fmt;

/// The name of a codebase: the literal name of its directory immediately
/// beneath the monorepository root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct CodebaseName(String);

impl CodebaseName {
    /// Wrap a directory name as a `CodebaseName`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// View the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodebaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CodebaseName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CodebaseName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for CodebaseName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The reserved name of the special postbuild codebase, built after the
/// requested codebase and never recorded into the cache.
pub const POSTBUILD_CODEBASE: &str = "postbuild";

/// The reserved name of the monorepository root directory.
pub const MONOREPOSITORY_DIR_NAME: &str = "monorepository";
