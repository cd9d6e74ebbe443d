//! Pluggable shipping of a finished archive to its destination.

use std::fs;
use std::path::{Path, PathBuf};

/// Accepts a finished archive and transports it elsewhere.
pub trait Uploader {
    /// Ship the archive at `archive_path`.
    ///
    /// # Errors
    ///
    /// Any failure to transport the archive should be returned as an error;
    /// the caller treats upload failure as fatal.
    fn upload(&self, archive_path: &Path) -> anyhow::Result<()>;
}

/// An uploader that copies the archive into a local directory.
///
/// This mirrors the reference implementation's fallback uploader, which
/// copies into `~/monorepo_artifacts`: it keeps `upload` runnable without
/// any external service configured.
#[derive(Debug, Clone)]
pub struct LocalDirectoryUploader {
    destination_dir: PathBuf,
}

impl LocalDirectoryUploader {
    /// Build an uploader that copies archives into `destination_dir`,
    /// creating it if necessary.
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_dir: destination_dir.into(),
        }
    }
}

impl Uploader for LocalDirectoryUploader {
    fn upload(&self, archive_path: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(&self.destination_dir)?;
        let file_name = archive_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("archive path '{}' has no file name", archive_path.display()))?;
        let dest = self.destination_dir.join(file_name);
        fs::copy(archive_path, &dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_directory_uploader_copies_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("out.tar.xz");
        fs::write(&archive, b"xz-data").unwrap();

        let dest_dir = tmp.path().join("dest");
        let uploader = LocalDirectoryUploader::new(&dest_dir);
        uploader.upload(&archive).unwrap();

        assert_eq!(
            fs::read(dest_dir.join("out.tar.xz")).unwrap(),
            b"xz-data"
        );
    }
}
