//! Computing the hermetic build fingerprint for a codebase.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::fs_util::{file_mode, sorted_relative_entries};

/// Source files are hashed in 16 KiB chunks so large files don't need to be
/// read into memory in one shot.
const CHUNK_SIZE: usize = 16 * 1024;

/// A finished SHA-1 digest, rendered as lowercase hex.
pub type Digest32 = String;

/// Hash a single file's contents in fixed-size chunks.
fn hash_file_contents(hasher: &mut Sha1, path: &Path) -> io::Result<()> {
    let mut file = fs::File::open(path)?;
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(())
}

/// Fold a path's entry (file or symlink) into the running hash: the path
/// bytes, the mode bytes, and then either the file's content (chunked) or,
/// for a symlink, its target string. Symlink targets are absorbed into the
/// hash without following the link, so a dangling symlink still fingerprints
/// deterministically.
fn hash_entry(hasher: &mut Sha1, root: &Path, relative: &Path) -> io::Result<()> {
    let absolute = root.join(relative);
    hasher.update(relative.to_string_lossy().as_bytes());

    let mode = file_mode(&absolute)?;
    hasher.update(mode.to_string().as_bytes());

    let metadata = fs::symlink_metadata(&absolute)?;
    if metadata.file_type().is_symlink() {
        let target = fs::read_link(&absolute)?;
        hasher.update(target.to_string_lossy().as_bytes());
    } else {
        hash_file_contents(hasher, &absolute)?;
    }
    Ok(())
}

/// Compute the fingerprint of a codebase's source tree, seeded with the
/// install prefix and the ordered digests of its already-resolved
/// dependencies.
///
/// The fold order is: prefix bytes, then each dependency digest in the order
/// given, then each source file (sorted by relative path) contributing its
/// path, mode, and content. Changing the order of any of these inputs
/// changes the resulting hash, which is the point: the fingerprint is a
/// fold over the codebase's entire hermetic build plan, not just its own
/// file contents.
pub fn compute_fingerprint(
    source_root: &Path,
    prefix: &Path,
    dependency_digests: &[Digest32],
) -> io::Result<Digest32> {
    let mut hasher = Sha1::new();

    hasher.update(prefix.to_string_lossy().as_bytes());

    for digest in dependency_digests {
        let raw = hex::decode(digest).unwrap_or_else(|_| digest.as_bytes().to_vec());
        hasher.update(&raw);
    }

    for relative in sorted_relative_entries(source_root)? {
        hash_entry(&mut hasher, source_root, &relative)?;
    }

    Ok(hex::encode(hasher.finalize()))
}
