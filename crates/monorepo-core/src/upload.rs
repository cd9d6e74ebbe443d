//! Archiving a finished prefix and handing it to an uploader.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, instrument};

use crate::builder;
use crate::codebase::Codebase;
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::stager::Stager;
use crate::types::CodebaseName;
use crate::uploader::Uploader;

/// Build `name`, archive the resulting prefix, and hand the archive to
/// `uploader`. Returns the path of the archive that was uploaded.
///
/// `archive_name` overrides the default name (sans `.tar.xz` extension); if
/// `None`, the name is `<codebase>-<timestamp>-<hash>`, where `timestamp`
/// has the shape `YYYY-MM-DDTHH-MM-SS` (colons replaced with hyphens so the
/// name is filesystem-safe).
#[instrument(skip(ctx, stager, uploader), fields(codebase = %name))]
pub fn upload(
    ctx: &BuildContext,
    name: &CodebaseName,
    stager: &dyn Stager,
    uploader: &dyn Uploader,
    archive_name: Option<String>,
    now: chrono::DateTime<chrono::Local>,
) -> Result<PathBuf> {
    builder::build(ctx, name, stager)?;

    let hash = Codebase::resolve(ctx, name)?;
    let archive_name = archive_name.unwrap_or_else(|| default_archive_name(name, &hash, now));

    let tmp_dir = tempfile::tempdir()?;
    let archive_path = tmp_dir.path().join(format!("{archive_name}.tar.xz"));
    archive_prefix(&ctx.prefix, &archive_path)?;
    info!(archive = %archive_path.display(), "archived prefix");

    uploader
        .upload(&archive_path)
        .map_err(|source| BuildError::UploaderFailure {
            archive: archive_path.clone(),
            source,
        })?;
    info!(archive = %archive_path.display(), "uploaded archive");

    // Keep the temp dir alive long enough for the uploader to have read the
    // file; persist it so the returned path stays valid for the caller.
    let _ = tmp_dir.into_path();

    Ok(archive_path)
}

fn default_archive_name(name: &CodebaseName, hash: &str, now: chrono::DateTime<chrono::Local>) -> String {
    let timestamp = now.format("%Y-%m-%dT%H-%M-%S");
    format!("{name}-{timestamp}-{hash}")
}

fn archive_prefix(prefix: &Path, archive_path: &Path) -> Result<()> {
    let status = Command::new("tar")
        .arg("--create")
        .arg("--xz")
        .arg("--file")
        .arg(archive_path)
        .arg(prefix)
        .env("XZ_OPT", "--threads=0 -0")
        .status()?;

    if !status.success() {
        return Err(BuildError::ArchivingFailed {
            prefix: prefix.to_path_buf(),
            status: status.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stager::LocalStager;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn default_archive_name_uses_hyphenated_timestamp() {
        let now = chrono::Local::now();
        let name = default_archive_name(&CodebaseName::new("alpha"), "deadbeef", now);
        assert!(name.starts_with("alpha-"));
        assert!(name.ends_with("-deadbeef"));
        assert!(!name.contains(':'));
    }

    #[derive(Debug, Clone, Default)]
    struct RecordingUploader {
        calls: Rc<RefCell<Vec<PathBuf>>>,
    }

    impl Uploader for RecordingUploader {
        fn upload(&self, archive_path: &Path) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(archive_path.to_path_buf());
            Ok(())
        }
    }

    fn write_codebase_with_build_script(root: &Path, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;

        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("metadata.yaml"), "dependencies: []\n").unwrap();
        let build_path = dir.join("build");
        std::fs::write(&build_path, script).unwrap();
        std::fs::set_permissions(&build_path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn upload_uses_caller_supplied_archive_name_and_calls_uploader_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mono = tmp.path().join("monorepository");
        write_codebase_with_build_script(
            &mono,
            "alpha",
            "#!/bin/sh\nmkdir -p \"$PREFIX/share\"\nprintf hello > \"$PREFIX/share/alpha.txt\"\n",
        );

        let ctx = BuildContext::new(
            mono.clone(),
            CodebaseName::new("alpha"),
            mono.join("prefix"),
            mono.join("metadata_prefix"),
        );
        let stager = LocalStager::new(mono.join("inputs"));
        let uploader = RecordingUploader::default();

        let archive_path = upload(
            &ctx,
            &CodebaseName::new("alpha"),
            &stager,
            &uploader,
            Some("foo".to_string()),
            chrono::Local::now(),
        )
        .unwrap();

        assert_eq!(archive_path.file_name().unwrap(), "foo.tar.xz");
        let calls = uploader.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], archive_path);
    }

    #[test]
    fn upload_derives_archive_name_when_none_supplied() {
        let tmp = tempfile::tempdir().unwrap();
        let mono = tmp.path().join("monorepository");
        write_codebase_with_build_script(
            &mono,
            "alpha",
            "#!/bin/sh\nmkdir -p \"$PREFIX/share\"\nprintf hello > \"$PREFIX/share/alpha.txt\"\n",
        );

        let ctx = BuildContext::new(
            mono.clone(),
            CodebaseName::new("alpha"),
            mono.join("prefix"),
            mono.join("metadata_prefix"),
        );
        let stager = LocalStager::new(mono.join("inputs"));
        let uploader = RecordingUploader::default();

        let archive_path = upload(
            &ctx,
            &CodebaseName::new("alpha"),
            &stager,
            &uploader,
            None,
            chrono::Local::now(),
        )
        .unwrap();

        let file_name = archive_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("alpha-"));
        assert!(file_name.ends_with(".tar.xz"));
        assert_eq!(uploader.calls.borrow().len(), 1);
    }
}
