//! Pluggable retrieval of declared input files into a staging directory.

use std::fs;
use std::path::Path;

/// Retrieves named input files into a directory before a build runs.
///
/// Implementations are expected to place each requested name at
/// `directory/<name>` before returning. Fetching inputs from a remote blob
/// store, a local cache, or any other source is entirely up to the
/// implementation; this crate does not verify the contents it receives
/// (hash verification of staged inputs is out of scope).
pub trait Stager {
    /// Place each of `names` under `directory`.
    ///
    /// # Errors
    ///
    /// Any failure to retrieve or write a named file should be returned as
    /// an error; the caller treats staging failure as fatal.
    fn stage(&self, directory: &Path, names: &[String]) -> anyhow::Result<()>;
}

/// A stager that expects every named input to already exist in a fixed
/// local source directory, and copies it into the staging directory.
///
/// This mirrors the reference implementation's local fallback: no network
/// access, suitable for tests and single-machine use where input files are
/// checked into the monorepository itself or dropped in by hand.
#[derive(Debug, Clone)]
pub struct LocalStager {
    source_dir: std::path::PathBuf,
}

impl LocalStager {
    /// Build a stager that serves files out of `source_dir`.
    pub fn new(source_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }
}

impl Stager for LocalStager {
    fn stage(&self, directory: &Path, names: &[String]) -> anyhow::Result<()> {
        fs::create_dir_all(directory)?;
        for name in names {
            let src = self.source_dir.join(name);
            let dst = directory.join(name);
            fs::copy(&src, &dst)
                .map_err(|e| anyhow::anyhow!("failed to stage input file '{name}': {e}"))?;
        }
        Ok(())
    }
}
