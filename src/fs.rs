//! Filesystem primitives used by the extraction engine.
//!
//! Thin async wrappers over `tokio::fs` with the semantics extraction needs:
//! idempotent directory creation, tolerant tree removal, and symlinks that
//! are never followed when replacing an existing path.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

/// Recursively delete `path`. A missing path is not an error.
pub async fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create `path` and all missing parents.
pub async fn ensure_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await
}

/// Metadata of `path` itself, without following a final symlink.
pub async fn lstat(path: &Path) -> io::Result<std::fs::Metadata> {
    fs::symlink_metadata(path).await
}

/// First existing symlink among the components of `path` below `root`.
///
/// Components that do not exist yet end the walk. `root` itself is not
/// inspected.
pub async fn symlink_below(root: &Path, path: &Path) -> io::Result<Option<PathBuf>> {
    let Ok(relative) = path.strip_prefix(root) else {
        return Ok(None);
    };

    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match lstat(&current).await {
            Ok(meta) if meta.file_type().is_symlink() => return Ok(Some(current)),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Remove a non-directory entry at `path` so it can be recreated.
///
/// Returns `true` when something was removed. Directories are left alone.
pub async fn remove_existing(path: &Path) -> io::Result<bool> {
    match lstat(path).await {
        Ok(meta) if meta.is_dir() => Ok(false),
        Ok(_) => fs::remove_file(path).await.map(|_| true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Create a symbolic link at `link` pointing to `target`.
pub async fn create_symlink(target: &str, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        fs::symlink(target, link).await
    }

    #[cfg(windows)]
    {
        fs::symlink_file(target, link).await
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (target, link);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symbolic links are not supported on this platform",
        ))
    }
}

/// Create (or truncate) a regular file for writing.
///
/// `mode` carries POSIX permission bits and is applied on Unix at creation
/// time, subject to the process umask.
pub async fn create_file(path: &Path, mode: u32) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode & 0o7777);
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path).await
}
