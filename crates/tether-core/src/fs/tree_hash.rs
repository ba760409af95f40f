//! Deterministic tree hashing for content verification.
//!
//! Used to verify that an installed core matches the cached artifact it was
//! copied from, and to fingerprint installed snapshots for diagnostics.

use std::fs;
use std::path::Path;

use anyhow::Context;

const DIR_MARKER: u8 = 0xFF;
const FILE_MARKER: u8 = 0x00;
const LINK_MARKER: u8 = 0x01;

/// Compute a deterministic blake3 hash of a directory tree.
///
/// Entries are visited in lexicographic order. Each entry feeds its
/// relative path, a type marker, and then its payload (file content or
/// symlink target) into the hasher. Empty directories count.
///
/// ```no_run
/// use tether_core::fs::hash_tree;
/// use std::path::Path;
///
/// let hash = hash_tree(Path::new("/path/to/dir"))?;
/// assert_eq!(hash.len(), 64);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn hash_tree(path: &Path) -> anyhow::Result<String> {
    let mut hasher = blake3::Hasher::new();
    hash_dir(&mut hasher, path, "")?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_dir(hasher: &mut blake3::Hasher, dir: &Path, base: &str) -> anyhow::Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let rel = if base.is_empty() {
            name.to_string_lossy().into_owned()
        } else {
            format!("{}/{}", base, name.to_string_lossy())
        };

        let path = entry.path();
        let ty = entry
            .file_type()
            .with_context(|| format!("Failed to stat file: {}", path.display()))?;

        hasher.update(rel.as_bytes());
        if ty.is_dir() {
            hasher.update(&[DIR_MARKER]);
            hash_dir(hasher, &path, &rel)?;
        } else if ty.is_file() {
            hasher.update(&[FILE_MARKER]);
            let content = fs::read(&path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            hasher.update(&(content.len() as u64).to_le_bytes());
            hasher.update(&content);
        } else if ty.is_symlink() {
            hasher.update(&[LINK_MARKER]);
            let target = fs::read_link(&path)
                .with_context(|| format!("Failed to read symlink: {}", path.display()))?;
            hasher.update(target.to_string_lossy().as_bytes());
        } else {
            anyhow::bail!("Unsupported filesystem entry type: {}", path.display());
        }
    }

    Ok(())
}
