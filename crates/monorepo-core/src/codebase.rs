//! Codebase objects: metadata plus their recursively computed fingerprint.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::fingerprint::compute_fingerprint;
use crate::metadata::Metadata;
use crate::types::CodebaseName;

/// A loaded codebase: its declared metadata and its fingerprint over
/// declared prefix, ordered dependency fingerprints, and sorted source
/// files.
#[derive(Debug, Clone)]
pub struct Codebase {
    /// The codebase's directory name.
    pub name: CodebaseName,
    /// Parsed `metadata.yaml`.
    pub metadata: Metadata,
    /// The SHA-1 fingerprint, as lowercase hex.
    pub hash: String,
}

impl Codebase {
    /// Resolve the fingerprint of `name`, loading and fingerprinting it (and
    /// any of its not-yet-resolved dependencies) as needed. Each codebase is
    /// loaded at most once per [`BuildContext`]; subsequent lookups are
    /// served from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::CyclicDependency`] if `name` is reached again
    /// while its own construction is still in progress, and propagates any
    /// error from loading metadata or fingerprinting its source tree.
    #[instrument(skip(ctx))]
    pub fn resolve(ctx: &BuildContext, name: &CodebaseName) -> Result<String> {
        let mut visiting = HashSet::new();
        Self::resolve_recursive(ctx, name, &mut visiting)
    }

    fn resolve_recursive(
        ctx: &BuildContext,
        name: &CodebaseName,
        visiting: &mut HashSet<CodebaseName>,
    ) -> Result<String> {
        if let Some(hash) = ctx.cached_hash(name) {
            return Ok(hash);
        }

        if !visiting.insert(name.clone()) {
            return Err(BuildError::CyclicDependency {
                codebase: name.to_string(),
            });
        }

        let root = ctx.codebase_root(name);
        let metadata = Metadata::load(&root, name)?;
        debug!(codebase = %name, "loaded metadata");

        let mut dependency_digests = Vec::with_capacity(metadata.dependencies.len());
        for dep in &metadata.dependencies {
            let dep_name = CodebaseName::new(dep.clone());
            let dep_hash = Self::resolve_recursive(ctx, &dep_name, visiting)?;
            dependency_digests.push(dep_hash);
        }

        let hash = compute_fingerprint(&root, &ctx.prefix, &dependency_digests)?;
        debug!(codebase = %name, hash = %hash, "computed fingerprint");

        visiting.remove(name);
        ctx.insert_codebase(Codebase {
            name: name.clone(),
            metadata,
            hash: hash.clone(),
        });

        Ok(hash)
    }
}
