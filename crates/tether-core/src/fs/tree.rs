//! Directory tree moves and copies.
//!
//! Backups are taken by moving trees (cheap on the same filesystem) and
//! restored by copying, so the backup survives a failed restore.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Recursively copy `src` into `dst`, creating `dst` if needed.
///
/// Regular files keep their permissions; symlinks are recreated verbatim
/// rather than followed.
pub fn copy_tree(src: &Path, dst: &Path) -> anyhow::Result<()> {
    let meta = fs::metadata(src)
        .with_context(|| format!("Failed to stat source directory: {}", src.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("Source path is not a directory: {}", src.display());
    }
    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory: {}", dst.display()))?;
    copy_dir_contents(src, dst, false)
}

fn copy_dir_contents(src: &Path, dst: &Path, skip_existing: bool) -> anyhow::Result<()> {
    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read dir: {}", src.display()))?
    {
        let entry =
            entry.with_context(|| format!("Failed to read dir entry: {}", src.display()))?;
        let ty = entry
            .file_type()
            .with_context(|| format!("Failed to stat dir entry: {}", entry.path().display()))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if ty.is_dir() {
            fs::create_dir_all(&to)
                .with_context(|| format!("Failed to create directory: {}", to.display()))?;
            copy_dir_contents(&from, &to, skip_existing)?;
        } else if skip_existing && fs::symlink_metadata(&to).is_ok() {
            continue;
        } else if ty.is_file() {
            fs::copy(&from, &to).with_context(|| {
                format!(
                    "Failed to copy file from {} to {}",
                    from.display(),
                    to.display()
                )
            })?;
        } else if ty.is_symlink() {
            let target = fs::read_link(&from)
                .with_context(|| format!("Failed to read symlink: {}", from.display()))?;
            create_symlink(&target, &to)
                .with_context(|| format!("Failed to recreate symlink: {}", to.display()))?;
        } else {
            anyhow::bail!("Unsupported filesystem entry type at {}", from.display());
        }
    }
    Ok(())
}

/// Move a directory tree to `dst`.
///
/// Falls back to copy-then-delete when `src` and `dst` live on different
/// devices. `dst` must not exist.
///
/// On error `src` is left complete and `dst` absent. The one exception is a
/// fallback that could neither finish deleting `src` nor put it back: then
/// `dst` is kept as the only complete copy and the error names it.
pub fn move_dir(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if dst.exists() {
        anyhow::bail!("Move destination already exists: {}", dst.display());
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device_os_error(&err) => {
            move_by_copy(src, dst, |path| fs::remove_dir_all(path))
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!(
            "Failed to move {} to {}",
            src.display(),
            dst.display()
        ))),
    }
}

fn move_by_copy(
    src: &Path,
    dst: &Path,
    remove_source: impl FnOnce(&Path) -> std::io::Result<()>,
) -> anyhow::Result<()> {
    if let Err(err) = copy_tree(src, dst) {
        if let Err(cleanup) = remove_path(dst) {
            tracing::warn!("Failed to clean up partial copy: {:#}", cleanup);
        }
        return Err(err.context(format!(
            "Failed to copy {} to {}",
            src.display(),
            dst.display()
        )));
    }

    let Err(remove_err) = remove_source(src) else {
        return Ok(());
    };
    let err = anyhow::Error::new(remove_err).context(format!(
        "Failed to remove {} after copying it to {}",
        src.display(),
        dst.display()
    ));

    // Entries that survived the removal are intact; put back only what went missing.
    if let Err(restore_err) = fs::create_dir_all(src)
        .map_err(anyhow::Error::from)
        .and_then(|()| copy_dir_contents(dst, src, true))
    {
        return Err(err.context(format!(
            "{} is partially removed and could not be restored ({:#}); \
             its complete copy is kept at {}",
            src.display(),
            restore_err,
            dst.display()
        )));
    }
    if let Err(cleanup) = remove_path(dst) {
        tracing::warn!("Failed to remove {} after restoring: {:#}", dst.display(), cleanup);
    }
    Err(err)
}

/// Remove a file, symlink or directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> anyhow::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context(format!("Failed to stat {}", path.display())));
        }
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.with_context(|| format!("Failed to remove {}", path.display()))
}

/// Pick a path next to `path` that does not exist yet.
///
/// Produces `.<name>.<tag>.<pid>` with a numeric suffix on collision.
pub fn unique_sibling_path(path: &Path, tag: &str) -> anyhow::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path has no parent: {}", path.display()))?;
    let base = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Path has no filename: {}", path.display()))?
        .to_string_lossy();

    for attempt in 0u32..1000 {
        let name = if attempt == 0 {
            format!(".{}.{}.{}", base, tag, std::process::id())
        } else {
            format!(".{}.{}.{}.{}", base, tag, std::process::id(), attempt)
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    anyhow::bail!("Failed to allocate a unique path next to {}", path.display());
}

fn is_cross_device_os_error(err: &std::io::Error) -> bool {
    let Some(code) = err.raw_os_error() else {
        return false;
    };

    #[cfg(unix)]
    {
        const EXDEV: i32 = 18;
        code == EXDEV
    }

    #[cfg(windows)]
    {
        const ERROR_NOT_SAME_DEVICE: i32 = 17;
        code == ERROR_NOT_SAME_DEVICE
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = code;
        false
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "Symlinks are not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create_dir_all should succeed in test temp dirs");
        }
        fs::write(path, content).expect("write should succeed in test temp dirs");
    }

    #[test]
    fn copy_tree_copies_nested_files() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let src = tmp.path().join("src");
        write_file(&src.join("a.txt"), "a");
        write_file(&src.join("nested/b.txt"), "b");

        let dst = tmp.path().join("dst");
        copy_tree(&src, &dst).expect("copy_tree should succeed");

        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dst.join("nested/b.txt")).unwrap(), "b");
        assert!(src.join("a.txt").exists(), "source must be left in place");
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_recreates_symlinks() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let src = tmp.path().join("src");
        write_file(&src.join("real.txt"), "real");
        std::os::unix::fs::symlink("real.txt", src.join("link.txt")).unwrap();

        let dst = tmp.path().join("dst");
        copy_tree(&src, &dst).expect("copy_tree should succeed");

        let target = fs::read_link(dst.join("link.txt")).expect("link should be copied");
        assert_eq!(target, PathBuf::from("real.txt"));
    }

    #[test]
    fn move_dir_refuses_existing_destination() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();

        let err = move_dir(&src, &dst).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(src.exists());
    }

    #[test]
    fn move_dir_creates_missing_parents() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let src = tmp.path().join("src");
        write_file(&src.join("file.txt"), "x");
        let dst = tmp.path().join("deep/er/dst");

        move_dir(&src, &dst).expect("move_dir should succeed");
        assert!(!src.exists());
        assert!(dst.join("file.txt").exists());
    }

    fn snapshot_tree(root: &Path) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let rel = path.strip_prefix(root).unwrap().display().to_string();
                    out.push((rel, fs::read_to_string(&path).unwrap()));
                }
            }
        }
        out.sort();
        out
    }

    #[test]
    fn copy_fallback_restores_source_when_removal_stops_partway() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let src = tmp.path().join("config");
        write_file(&src.join("info.toml"), "label = \"a\"\n");
        write_file(&src.join("env/project.toml"), "id = 1\n");
        write_file(&src.join("hooks/startup.toml"), "run = true\n");
        let before = snapshot_tree(&src);
        let dst = tmp.path().join("backup/config");

        let err = move_by_copy(&src, &dst, |path| {
            fs::remove_dir_all(path.join("env"))?;
            fs::remove_file(path.join("info.toml"))?;
            Err(std::io::Error::other("entry is busy"))
        })
        .unwrap_err();

        assert!(format!("{:#}", err).contains("entry is busy"));
        assert_eq!(snapshot_tree(&src), before);
        assert!(!dst.exists(), "copy must be dropped once the source is whole again");
    }

    #[test]
    fn copy_fallback_keeps_copy_when_source_cannot_be_restored() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let src = tmp.path().join("config");
        write_file(&src.join("info.toml"), "label = \"a\"\n");
        write_file(&src.join("env/project.toml"), "id = 1\n");
        let before = snapshot_tree(&src);
        let dst = tmp.path().join("backup/config");

        let err = move_by_copy(&src, &dst, |path| {
            fs::remove_dir_all(path)?;
            fs::write(path, "not a directory")?;
            Err(std::io::Error::other("entry is busy"))
        })
        .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains(&dst.display().to_string()), "{}", message);
        assert_eq!(snapshot_tree(&dst), before);
    }

    #[test]
    fn copy_fallback_moves_tree_when_removal_succeeds() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let src = tmp.path().join("core");
        write_file(&src.join("VERSION"), "v0.19.0");
        let dst = tmp.path().join("backup/core");

        move_by_copy(&src, &dst, |path| fs::remove_dir_all(path)).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(dst.join("VERSION")).unwrap(), "v0.19.0");
    }

    #[test]
    fn remove_path_ignores_missing() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        remove_path(&tmp.path().join("nope")).expect("missing path is fine");
    }

    #[test]
    fn unique_sibling_path_skips_existing() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let target = tmp.path().join("bundle");
        let first = unique_sibling_path(&target, "tmp").unwrap();
        fs::create_dir_all(&first).unwrap();
        let second = unique_sibling_path(&target, "tmp").unwrap();

        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(tmp.path()));
        assert!(
            first
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(".bundle.tmp.")
        );
    }
}
