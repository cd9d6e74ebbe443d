//! Parsing `<codebase>/metadata.yaml`.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{BuildError, Result};
use crate::types::CodebaseName;

/// A single entry of `input_files` in `metadata.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct InputFile {
    /// The name the stager is asked to materialize.
    pub name: String,
}

/// The recognized shape of `metadata.yaml`. Unrecognized top-level keys are
/// ignored rather than rejected, matching the reference implementation's
/// permissive parsing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    /// Declared dependency codebase names, in the order they must be
    /// absorbed into the fingerprint and built.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Declared input files to stage before the build command runs.
    #[serde(default)]
    pub input_files: Vec<InputFile>,
}

impl Metadata {
    /// Load and parse `<codebase_root>/metadata.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MetadataMissing`] if the file cannot be read,
    /// and [`BuildError::MetadataMalformed`] if it can be read but does not
    /// parse as valid YAML or a recognized key has the wrong shape.
    pub fn load(codebase_root: &Path, codebase: &CodebaseName) -> Result<Self> {
        let path = codebase_root.join("metadata.yaml");
        let raw = fs::read_to_string(&path).map_err(|source| BuildError::MetadataMissing {
            codebase: codebase.to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| BuildError::MetadataMalformed {
            codebase: codebase.to_string(),
            source,
        })
    }
}
