use std::path::{Path, PathBuf};

/// POSIX file-type mask.
pub const S_IFMT: u32 = 0o170000;
/// POSIX symlink file type.
pub const S_IFLNK: u32 = 0o120000;
/// Regular file, rw-r--r--.
pub const DEFAULT_FILE_MODE: u32 = 0o100644;

/// Decode a raw entry name.
///
/// Names are always read as UTF-8, whatever the archive's encoding flag
/// claims; invalid sequences become U+FFFD. Backslashes written by some
/// Windows tools are turned into `/`.
pub fn decode_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace('\\', "/")
}

/// POSIX mode stored in the upper half of the external attributes, or
/// [`DEFAULT_FILE_MODE`] when the archive recorded none.
pub fn file_mode(external_attributes: u32) -> u32 {
    match external_attributes >> 16 {
        0 => DEFAULT_FILE_MODE,
        mode => mode,
    }
}

pub fn is_symlink(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

/// Join a normalized entry name onto `root`.
///
/// Returns `None` for names that would land outside `root`: absolute
/// paths, `..` components, and drive prefixes on Windows.
pub fn resolve_target(root: &Path, name: &str) -> Option<PathBuf> {
    if name.starts_with('/') {
        return None;
    }

    let mut path = root.to_path_buf();
    for component in name.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            c if cfg!(windows) && c.contains(':') => return None,
            c => path.push(c),
        }
    }
    Some(path)
}
