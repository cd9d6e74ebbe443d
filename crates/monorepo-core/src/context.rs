//! The explicit configuration and memoization context threaded through a run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::codebase::Codebase;
use crate::discovery::{self, Location};
use crate::error::Result;
use crate::types::CodebaseName;

/// The explicit replacement for the reference implementation's module-level
/// globals: monorepository root, current codebase name, install prefix,
/// metadata prefix, and the codebase registry, all owned by one value
/// instead of scattered across process state.
#[derive(Debug)]
pub struct BuildContext {
    /// The directory named `monorepository`.
    pub monorepository_root: PathBuf,
    /// The codebase the user invoked the builder from.
    pub current_codebase: CodebaseName,
    /// Install root for build outputs.
    pub prefix: PathBuf,
    /// Root for manifests, the CAS, and build logs.
    pub metadata_prefix: PathBuf,
    /// The directory the process was invoked from, captured once at
    /// startup so the builder never needs to re-derive or mutate it.
    pub original_directory: PathBuf,
    registry: RefCell<HashMap<CodebaseName, Codebase>>,
}

impl BuildContext {
    /// Resolve a `BuildContext` from the current working directory and
    /// optional CLI overrides for `prefix`/`metadata_prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the monorepository root cannot be located (see
    /// [`discovery::find_code_base_root`]).
    #[instrument(skip_all)]
    pub fn discover(prefix: Option<PathBuf>, metadata_prefix: Option<PathBuf>) -> Result<Self> {
        let cwd = env::current_dir()?;
        let Location {
            monorepository_root,
            codebase_name,
        } = discovery::find_code_base_root(&cwd)?;

        let prefix = prefix.unwrap_or_else(|| monorepository_root.join("prefix"));
        let metadata_prefix =
            metadata_prefix.unwrap_or_else(|| monorepository_root.join("metadata_prefix"));

        Ok(Self {
            monorepository_root,
            current_codebase: codebase_name,
            prefix,
            metadata_prefix,
            original_directory: cwd,
            registry: RefCell::new(HashMap::new()),
        })
    }

    /// Build a context directly from already-known values, bypassing
    /// filesystem discovery. Used by tests that construct their own
    /// temporary monorepository layouts.
    pub fn new(
        monorepository_root: PathBuf,
        current_codebase: CodebaseName,
        prefix: PathBuf,
        metadata_prefix: PathBuf,
    ) -> Self {
        Self {
            original_directory: monorepository_root.join(current_codebase.as_str()),
            monorepository_root,
            current_codebase,
            prefix,
            metadata_prefix,
            registry: RefCell::new(HashMap::new()),
        }
    }

    /// The directory of a codebase under the monorepository root.
    pub fn codebase_root(&self, name: &CodebaseName) -> PathBuf {
        self.monorepository_root.join(name.as_str())
    }

    /// Whether the registry already holds a (fully constructed) entry for
    /// `name`.
    pub fn has_codebase(&self, name: &CodebaseName) -> bool {
        self.registry.borrow().contains_key(name)
    }

    /// Fetch a previously loaded codebase's fingerprint, if present.
    pub fn cached_hash(&self, name: &CodebaseName) -> Option<String> {
        self.registry.borrow().get(name).map(|c| c.hash.clone())
    }

    /// Insert a freshly constructed codebase into the registry.
    pub fn insert_codebase(&self, codebase: Codebase) {
        self.registry
            .borrow_mut()
            .insert(codebase.name.clone(), codebase);
    }

    /// Whether a `postbuild` sibling directory exists under the
    /// monorepository root.
    pub fn has_postbuild(&self) -> bool {
        self.monorepository_root
            .join(crate::types::POSTBUILD_CODEBASE)
            .is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let mono = tmp.path().join("monorepository");
        let alpha = mono.join("alpha");
        fs::create_dir_all(&alpha).unwrap();
        fs::write(alpha.join("metadata.yaml"), "dependencies: []\n").unwrap();
        (tmp, mono)
    }

    #[test]
    fn new_initializes_an_empty_registry() {
        let (_tmp, mono) = layout();
        let ctx = BuildContext::new(
            mono.clone(),
            CodebaseName::new("alpha"),
            mono.join("prefix"),
            mono.join("metadata_prefix"),
        );
        assert!(!ctx.has_codebase(&CodebaseName::new("alpha")));
        assert_eq!(ctx.codebase_root(&CodebaseName::new("alpha")), mono.join("alpha"));
    }

    #[test]
    fn has_postbuild_reflects_sibling_directory() {
        let (_tmp, mono) = layout();
        let ctx = BuildContext::new(
            mono.clone(),
            CodebaseName::new("alpha"),
            mono.join("prefix"),
            mono.join("metadata_prefix"),
        );
        assert!(!ctx.has_postbuild());

        fs::create_dir_all(mono.join("postbuild")).unwrap();
        assert!(ctx.has_postbuild());
    }
}
