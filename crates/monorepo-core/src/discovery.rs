//! Locating the monorepository root and the codebase the user is standing in.

use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::types::{CodebaseName, MONOREPOSITORY_DIR_NAME};

/// The result of walking up from the working directory: the monorepository
/// root itself, and the name of the codebase directory on the path down to
/// `cwd`.
#[derive(Debug, Clone)]
pub struct Location {
    /// The directory named `monorepository`.
    pub monorepository_root: PathBuf,
    /// The codebase directory immediately beneath the root.
    pub codebase_name: CodebaseName,
}

/// Find the nearest ancestor of `cwd` whose own name is `monorepository`, and
/// the codebase directory immediately beneath it on the path down to `cwd`.
///
/// Unlike the reference implementation this is derived from -- which walks
/// two path components per iteration and only works when `cwd` *is* the
/// codebase root -- this walks one ancestor at a time, so `cwd` may be
/// arbitrarily deep inside the codebase (e.g. a build script invoking this
/// from a nested `src/` directory).
///
/// # Errors
///
/// Returns [`BuildError::MonorepositoryNotFound`] if no ancestor is named
/// `monorepository`.
pub fn find_code_base_root(cwd: &Path) -> Result<Location> {
    let mut child: Option<&Path> = None;
    let mut current = cwd;

    loop {
        if current.file_name().and_then(|n| n.to_str()) == Some(MONOREPOSITORY_DIR_NAME) {
            let Some(child) = child else {
                // `cwd` itself is the monorepository root; there is no
                // codebase directory beneath it on the path to `cwd`.
                return Err(BuildError::MonorepositoryNotFound {
                    cwd: cwd.to_path_buf(),
                });
            };
            let codebase_name = child
                .file_name()
                .and_then(|n| n.to_str())
                .expect("child path component always has a file name")
                .to_string();
            return Ok(Location {
                monorepository_root: current.to_path_buf(),
                codebase_name: CodebaseName::new(codebase_name),
            });
        }

        child = Some(current);
        match current.parent() {
            Some(parent) => current = parent,
            None => {
                return Err(BuildError::MonorepositoryNotFound {
                    cwd: cwd.to_path_buf(),
                });
            }
        }
    }
}
