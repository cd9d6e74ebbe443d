//! The artifact cache: manifest serialization, CAS population, and restore.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{BuildError, Result};
use crate::fs_util::link_tolerating_existing;

/// A manifest recording every output of one codebase build at one
/// fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Name of the codebase this manifest belongs to.
    pub code_base: String,
    /// The install prefix this manifest's outputs were built against.
    pub prefix: PathBuf,
    /// The codebase's fingerprint, as lowercase hex.
    pub hash: String,
    /// Output path -> (content hash, mode).
    pub files: BTreeMap<String, (String, u32)>,
    /// Output path -> symlink target.
    pub symbolic_links: BTreeMap<String, String>,
}

impl Manifest {
    /// The manifest path for a codebase at a given fingerprint, under
    /// `metadata_prefix`.
    pub fn path_for(metadata_prefix: &Path, code_base: &str, hash: &str) -> PathBuf {
        metadata_prefix.join(format!("artifacts-{code_base}-{hash}.json"))
    }

    /// The directory holding CAS blobs, under `metadata_prefix`.
    pub fn cas_dir(metadata_prefix: &Path) -> PathBuf {
        metadata_prefix.join("cas")
    }

    /// Write this manifest to its canonical path under `metadata_prefix`.
    #[instrument(skip_all, fields(code_base = %self.code_base, hash = %self.hash))]
    pub fn record(&self, metadata_prefix: &Path) -> Result<()> {
        let path = Self::path_for(metadata_prefix, &self.code_base, &self.hash);
        let json = serde_json::to_vec_pretty(self)
            .map_err(|source| BuildError::ManifestMalformed {
                path: path.clone(),
                source,
            })?;
        fs::write(&path, json)?;
        debug!(path = %path.display(), "wrote manifest");
        Ok(())
    }

    /// Populate the CAS with every output recorded in `files`. Idempotent:
    /// entries already present are skipped.
    #[instrument(skip_all, fields(code_base = %self.code_base))]
    pub fn populate_cas(&self, metadata_prefix: &Path) -> Result<()> {
        let cas_dir = Self::cas_dir(metadata_prefix);
        fs::create_dir_all(&cas_dir)?;

        let mut existing: HashSet<String> = fs::read_dir(&cas_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();

        for (output_path, (hash, mode)) in &self.files {
            let name = format!("{hash}-{mode}");
            if existing.contains(&name) {
                continue;
            }
            let dst = cas_dir.join(&name);
            fs::hard_link(output_path, &dst).map_err(|source| BuildError::CasLinkOtherError {
                src: PathBuf::from(output_path),
                dst: dst.clone(),
                source,
            })?;
            existing.insert(name);
        }
        debug!(count = self.files.len(), "populated CAS");
        Ok(())
    }
}

/// Walk `prefix` recursively and classify every entry as a content-hashed
/// regular file or a recorded symlink target, ready to drop into a
/// [`Manifest`]. Directories are not recorded.
#[instrument(skip_all)]
pub fn enumerate_outputs(
    prefix: &Path,
) -> Result<(BTreeMap<String, (String, u32)>, BTreeMap<String, String>)> {
    use sha1::{Digest as _, Sha1};

    let mut files = BTreeMap::new();
    let mut symbolic_links = BTreeMap::new();

    for entry in walkdir::WalkDir::new(prefix).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(path)?;
            symbolic_links.insert(
                path.to_string_lossy().to_string(),
                target.to_string_lossy().to_string(),
            );
        } else if file_type.is_file() {
            let mut hasher = Sha1::new();
            let mut handle = fs::File::open(path)?;
            std::io::copy(&mut handle, &mut hasher)?;
            let digest = hex::encode(hasher.finalize());
            let mode = fs::symlink_metadata(path)?.permissions().mode();
            files.insert(path.to_string_lossy().to_string(), (digest, mode));
        }
    }

    Ok((files, symbolic_links))
}

/// Attempt to restore a codebase's outputs from a previously recorded
/// manifest. Returns `true` on a cache hit (outputs were restored), `false`
/// on a clean miss (no manifest on disk).
#[instrument(skip_all, fields(%code_base, %hash))]
pub fn restore(metadata_prefix: &Path, code_base: &str, hash: &str) -> Result<bool> {
    let manifest_path = Manifest::path_for(metadata_prefix, code_base, hash);
    if !manifest_path.is_file() {
        return Ok(false);
    }

    let raw = fs::read(&manifest_path)?;
    let manifest: Manifest =
        serde_json::from_slice(&raw).map_err(|source| BuildError::ManifestMalformed {
            path: manifest_path.clone(),
            source,
        })?;

    let cas_dir = Manifest::cas_dir(metadata_prefix);

    for (output_path, (file_hash, mode)) in &manifest.files {
        let output_path = Path::new(output_path);
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = cas_dir.join(format!("{file_hash}-{mode}"));
        link_tolerating_existing(&blob, output_path).map_err(|source| {
            BuildError::CasLinkOtherError {
                src: blob.clone(),
                dst: output_path.to_path_buf(),
                source,
            }
        })?;
        fs::set_permissions(output_path, fs::Permissions::from_mode(*mode))?;
    }

    for (link_path, target) in &manifest.symbolic_links {
        let link_path = Path::new(link_path);
        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent)?;
        }
        match symlink(target, link_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(path = %link_path.display(), "symlink already exists during restore");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(true)
}
