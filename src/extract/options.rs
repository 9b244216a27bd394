use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;

/// Callback invoked for every entry before it is materialized.
pub type OnEntry = Arc<dyn Fn(&EntryEvent) -> Result<EntryAction, BoxError> + Send + Sync>;

/// How symlink entries are written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymlinkPolicy {
    /// Real symlinks everywhere except Windows, where creating one needs
    /// elevated privileges; there the link target is written as a plain file.
    #[default]
    PlatformDefault,
    /// Always create real symlinks. Permission errors propagate.
    AlwaysRealSymlink,
    /// Always write the link target text into a regular file.
    AlwaysPlainFile,
}

impl SymlinkPolicy {
    /// Whether symlink entries become real symlinks on this platform.
    pub fn creates_links(self) -> bool {
        match self {
            SymlinkPolicy::AlwaysRealSymlink => true,
            SymlinkPolicy::AlwaysPlainFile => false,
            SymlinkPolicy::PlatformDefault => !cfg!(windows),
        }
    }
}

/// The entry about to be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryEvent {
    /// Entry name, UTF-8 decoded, with `/` separators.
    pub name: String,
    /// Position of the entry in the archive, starting at zero.
    pub index: usize,
    /// Total number of entries in the archive.
    pub entry_count: usize,
}

impl EntryEvent {
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Decision returned by the entry callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryAction {
    #[default]
    Proceed,
    /// Leave the entry out. It still counts as handled.
    Skip,
}

#[derive(Clone, Default)]
pub struct ExtractOptions {
    /// Delete the target directory tree before extracting.
    pub overwrite: bool,
    pub symlink_policy: SymlinkPolicy,
    pub on_entry: Option<OnEntry>,
}

impl ExtractOptions {
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn symlink_policy(mut self, policy: SymlinkPolicy) -> Self {
        self.symlink_policy = policy;
        self
    }

    /// `true` keeps the Windows plain-file fallback; `false` demands real
    /// symlinks on every platform.
    pub fn symlink_as_file_on_windows(self, enabled: bool) -> Self {
        self.symlink_policy(if enabled {
            SymlinkPolicy::PlatformDefault
        } else {
            SymlinkPolicy::AlwaysRealSymlink
        })
    }

    pub fn on_entry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&EntryEvent) -> Result<EntryAction, BoxError> + Send + Sync + 'static,
    {
        self.on_entry = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("overwrite", &self.overwrite)
            .field("symlink_policy", &self.symlink_policy)
            .field("on_entry", &self.on_entry.is_some())
            .finish()
    }
}

/// Counts reported by a successful extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub entries: u64,
    pub directories: u64,
    pub files: u64,
    pub symlinks: u64,
    pub skipped: u64,
}
