//! Error taxonomy for the monorepository builder.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while discovering, fingerprinting, building,
/// restoring, or uploading a codebase.
#[derive(Error, Debug)]
pub enum BuildError {
    /// No ancestor directory named `monorepository` was found above the
    /// working directory.
    #[error("could not find a 'monorepository' ancestor directory above {cwd}")]
    MonorepositoryNotFound {
        /// The working directory the search started from.
        cwd: PathBuf,
    },

    /// `<codebase>/metadata.yaml` could not be read.
    #[error("metadata.yaml for codebase '{codebase}' could not be read: {source}")]
    MetadataMissing {
        /// Name of the codebase whose metadata is missing.
        codebase: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// `<codebase>/metadata.yaml` could be read but did not parse as valid
    /// YAML, or a recognized key had the wrong shape.
    #[error("metadata.yaml for codebase '{codebase}' is malformed: {source}")]
    MetadataMalformed {
        /// Name of the codebase whose metadata is malformed.
        codebase: String,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A codebase was re-entered while its own construction (metadata load
    /// and fingerprinting) was still in progress.
    #[error("circular dependency detected: '{codebase}' depends on itself, directly or transitively")]
    CyclicDependency {
        /// The codebase whose re-entry closed the cycle.
        codebase: String,
    },

    /// Neither a `build` executable nor a `Makefile` was present in the
    /// codebase's temporary working tree.
    #[error("codebase '{codebase}' has neither a 'build' script nor a 'Makefile'")]
    NoBuildRecipe {
        /// Name of the codebase that could not be built.
        codebase: String,
    },

    /// The build subprocess exited with a non-zero status.
    #[error("build command for codebase '{codebase}' failed (exit status: {status}); see {stderr_log}")]
    BuildCommandFailed {
        /// Name of the codebase whose build command failed.
        codebase: String,
        /// The process exit status, formatted for display.
        status: String,
        /// Path to the preserved stderr log.
        stderr_log: PathBuf,
    },

    /// A hard-link call during restore or CAS population failed for a
    /// reason other than the destination already existing.
    #[error("failed to hard-link '{src}' to '{dst}': {source}")]
    CasLinkOtherError {
        /// The CAS entry being linked from.
        src: PathBuf,
        /// The destination path.
        dst: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The pluggable input stager failed.
    #[error("staging input files for codebase '{codebase}' failed: {source}")]
    StagerFailure {
        /// Name of the codebase whose inputs failed to stage.
        codebase: String,
        /// Underlying error from the stager implementation.
        #[source]
        source: anyhow::Error,
    },

    /// The pluggable artifact uploader failed.
    #[error("uploading archive '{archive}' failed: {source}")]
    UploaderFailure {
        /// Path to the archive that failed to upload.
        archive: PathBuf,
        /// Underlying error from the uploader implementation.
        #[source]
        source: anyhow::Error,
    },

    /// The `tar` subprocess used to archive the prefix exited non-zero.
    #[error("archiving prefix '{prefix}' failed (exit status: {status})")]
    ArchivingFailed {
        /// The prefix directory that was being archived.
        prefix: PathBuf,
        /// The process exit status, formatted for display.
        status: String,
    },

    /// Any other propagated I/O error not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A manifest file could not be parsed as JSON.
    #[error("manifest at {path} is not valid JSON: {source}")]
    ManifestMalformed {
        /// Path to the offending manifest file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, BuildError>;
