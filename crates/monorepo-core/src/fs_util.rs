//! Filesystem helpers shared by the fingerprinter, cache, and builder.

use std::fs;
use std::io;
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Recursively walk `root`, returning every regular file and symlink beneath
/// it (directories themselves are not yielded), sorted by path relative to
/// `root`.
///
/// Symlinks are reported but never followed: `WalkDir` is configured with
/// `follow_links(false)`, so a symlink to a directory is yielded as a single
/// leaf entry rather than descended into.
pub fn sorted_relative_entries(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).into_iter() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir entries are always under root")
            .to_path_buf();
        entries.push(relative);
    }
    entries.sort();
    Ok(entries)
}

/// The mode bits of a path's metadata, without following symlinks.
pub fn file_mode(path: &Path) -> io::Result<u32> {
    Ok(fs::symlink_metadata(path)?.mode())
}

/// Clear the write bits (owner, group, other) on `path` in place.
pub fn strip_write_bits(path: &Path) -> io::Result<()> {
    let metadata = fs::metadata(path)?;
    let mut perms = metadata.permissions();
    let mode = perms.mode() & !0o222;
    perms.set_mode(mode);
    fs::set_permissions(path, perms)
}

/// Recursively clear the write bits on every regular file beneath `root`.
/// Directories and symlinks are left untouched so the tree can still be
/// traversed (and so restoring a build doesn't try to chmod a symlink's
/// target).
pub fn freeze_tree(root: &Path) -> io::Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            strip_write_bits(entry.path())?;
        }
    }
    Ok(())
}

/// Copy a directory tree, preserving symlinks as symlinks (rather than
/// following them) and preserving mode bits on regular files.
///
/// `fs_extra::dir::copy` follows symlinks and does not preserve permissions,
/// which is wrong for a hermetic source copy, so this walks the tree itself.
pub fn copy_tree_preserving_modes(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir entries are always under root");
        let target = dst.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            match symlink(&link_target, &target) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err),
            }
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            let mode = file_mode(entry.path())?;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

/// Hard-link `src` to `dst`, tolerating the case where `dst` already exists
/// (another build already populated or restored it).
pub fn link_tolerating_existing(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::hard_link(src, dst) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt as _;

    #[test]
    fn sorted_relative_entries_sorts_and_skips_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("b")).unwrap();
        fs::write(tmp.path().join("b/two"), b"2").unwrap();
        fs::write(tmp.path().join("a_one"), b"1").unwrap();

        let entries = sorted_relative_entries(tmp.path()).unwrap();
        assert_eq!(
            entries,
            vec![PathBuf::from("a_one"), PathBuf::from("b/two")]
        );
    }

    #[test]
    fn freeze_tree_clears_write_bits_on_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sub");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("f");
        fs::write(&file, b"x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();

        freeze_tree(tmp.path()).unwrap();

        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o444);
    }

    #[test]
    fn copy_tree_preserves_symlinks_without_following() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("real"), b"data").unwrap();
        symlink("real", src.join("link")).unwrap();

        copy_tree_preserving_modes(&src, &dst).unwrap();

        assert!(dst.join("real").exists());
        let link_meta = fs::symlink_metadata(dst.join("link")).unwrap();
        assert!(link_meta.file_type().is_symlink());
        assert_eq!(fs::read_link(dst.join("link")).unwrap(), PathBuf::from("real"));
    }

    #[test]
    fn link_tolerating_existing_does_not_error_on_repeat() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::write(&src, b"x").unwrap();

        link_tolerating_existing(&src, &dst).unwrap();
        link_tolerating_existing(&src, &dst).unwrap();
    }
}
