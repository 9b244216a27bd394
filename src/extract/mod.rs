//! The extraction engine.
//!
//! [`Extractor`] walks an archive strictly in storage order, one entry at a
//! time: the entry callback runs, then the entry is skipped or written out as
//! a directory, a regular file, or a symlink. Every await point races the
//! run's cancellation token, and the single in-flight file write is
//! registered so [`Extractor::cancel`] can abort it directly.

mod cancel;
mod entry;
mod options;

pub use cancel::CancelHandle;
pub use entry::{DEFAULT_FILE_MODE, decode_name, file_mode, is_symlink, resolve_target};
pub use options::{EntryAction, EntryEvent, ExtractOptions, ExtractSummary, OnEntry, SymlinkPolicy};

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ArchiveError, ExtractError, Result};
use crate::fs;
use crate::io::{LocalFileReader, ReadAt};
use crate::zip::{ArchiveReader, EntryStream, RawEntry};

use cancel::CancelState;

/// What a non-directory entry turned into.
enum Written {
    File,
    Symlink,
}

/// Streams ZIP archives to disk.
///
/// An extractor can be reused for any number of extractions as long as they
/// do not overlap. [`cancel`](Self::cancel) (or a [`CancelHandle`]) aborts
/// the extraction currently running.
///
/// ## Example
///
/// ```no_run
/// use std::path::Path;
/// use zipdrop::{EntryAction, ExtractOptions, Extractor};
///
/// # async fn run() -> Result<(), zipdrop::ExtractError> {
/// let options = ExtractOptions::default()
///     .overwrite(true)
///     .on_entry(|event| {
///         Ok(if event.name.starts_with("docs/") {
///             EntryAction::Skip
///         } else {
///             EntryAction::Proceed
///         })
///     });
/// let extractor = Extractor::new(options);
/// let summary = extractor
///     .extract(Path::new("release.zip"), Path::new("out"))
///     .await?;
/// println!("{} files", summary.files);
/// # Ok(())
/// # }
/// ```
pub struct Extractor {
    options: ExtractOptions,
    state: Arc<CancelState>,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            state: Arc::new(CancelState::default()),
        }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Abort the running extraction, which then fails with
    /// [`ExtractError::Canceled`]. Does nothing when idle.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Extract the archive at `archive_path` into `target`.
    #[instrument(skip_all, fields(archive = %archive_path.display(), target = %target.display()))]
    pub async fn extract(&self, archive_path: &Path, target: &Path) -> Result<ExtractSummary> {
        let label = archive_path.display().to_string();
        self.run(&label, target, open_local(archive_path)).await
    }

    /// Extract an archive read from an arbitrary source, such as an
    /// [`HttpRangeReader`](crate::HttpRangeReader). `label` names the source
    /// in errors and logs.
    #[instrument(skip_all, fields(archive = label, target = %target.display()))]
    pub async fn extract_from<R: ReadAt>(
        &self,
        source: Arc<R>,
        label: &str,
        target: &Path,
    ) -> Result<ExtractSummary> {
        self.run(label, target, ArchiveReader::open(source)).await
    }

    async fn run<R, F>(&self, label: &str, target: &Path, open: F) -> Result<ExtractSummary>
    where
        R: ReadAt,
        F: Future<Output = std::result::Result<ArchiveReader<R>, ArchiveError>>,
    {
        let token = self.state.reset();
        let result = self.run_inner(&token, label, target, open).await;
        self.state.clear_archive();

        match result {
            // Errors caused by the cancellation itself (closed reader,
            // dropped writes) are not reported.
            _ if token.is_cancelled() => {
                info!("extraction canceled");
                Err(ExtractError::Canceled)
            }
            Ok(summary) => {
                info!(
                    entries = summary.entries,
                    files = summary.files,
                    directories = summary.directories,
                    symlinks = summary.symlinks,
                    skipped = summary.skipped,
                    "extraction complete"
                );
                Ok(summary)
            }
            Err(err) => {
                warn!(error = %err, "extraction failed");
                Err(err)
            }
        }
    }

    async fn run_inner<R, F>(
        &self,
        token: &CancellationToken,
        label: &str,
        target: &Path,
        open: F,
    ) -> Result<ExtractSummary>
    where
        R: ReadAt,
        F: Future<Output = std::result::Result<ArchiveReader<R>, ArchiveError>>,
    {
        if self.options.overwrite {
            debug!("removing existing target");
            cancellable(token, fs::remove_tree(target))
                .await?
                .map_err(|e| ExtractError::fs(target, e))?;
        }
        cancellable(token, fs::ensure_dir(target))
            .await?
            .map_err(|e| ExtractError::fs(target, e))?;

        let mut archive = cancellable(token, open)
            .await?
            .map_err(|source| ExtractError::ArchiveOpen {
                archive: label.to_string(),
                source,
            })?;

        // Register before checking the flag: a cancel() racing with the open
        // either sees the closer or we see the flag.
        self.state.register_archive(archive.closer());
        if token.is_cancelled() {
            archive.close();
            return Err(ExtractError::Canceled);
        }

        let result = self.extract_entries(token, &mut archive, target).await;
        archive.close();
        result
    }

    async fn extract_entries<R: ReadAt>(
        &self,
        token: &CancellationToken,
        archive: &mut ArchiveReader<R>,
        target: &Path,
    ) -> Result<ExtractSummary> {
        let total = archive.entry_count();
        let create_links = self.options.symlink_policy.creates_links();
        debug!(entries = total, create_links, "archive opened");

        let mut summary = ExtractSummary {
            entries: total,
            ..Default::default()
        };
        let mut written_paths: HashSet<PathBuf> = HashSet::new();
        let mut accounted = 0u64;

        loop {
            if token.is_cancelled() {
                return Err(ExtractError::Canceled);
            }
            let raw = match archive.next_entry() {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(source) => {
                    return Err(ExtractError::EntryRead {
                        entry: format!("#{accounted}"),
                        source,
                    });
                }
            };

            let event = EntryEvent {
                name: decode_name(&raw.raw_name),
                index: accounted as usize,
                entry_count: total as usize,
            };

            let action = match &self.options.on_entry {
                Some(callback) => callback(&event).map_err(|source| ExtractError::Callback {
                    entry: event.name.clone(),
                    source,
                })?,
                None => EntryAction::Proceed,
            };

            if action == EntryAction::Skip {
                debug!(entry = %event.name, "skipped by callback");
                summary.skipped += 1;
                accounted += 1;
                continue;
            }

            let dest = resolve_target(target, &event.name).ok_or_else(|| ExtractError::UnsafePath {
                entry: event.name.clone(),
            })?;

            // Earlier entries may have planted symlinks; never write through them.
            let parent = if event.is_directory() {
                dest.as_path()
            } else {
                dest.parent().unwrap_or(target)
            };
            if let Some(link) = cancellable(token, fs::symlink_below(target, parent))
                .await?
                .map_err(|e| ExtractError::fs(parent, e))?
            {
                warn!(entry = %event.name, link = %link.display(), "entry path passes through a symlink");
                return Err(ExtractError::UnsafePath {
                    entry: event.name.clone(),
                });
            }

            if event.is_directory() {
                debug!(entry = %event.name, "directory");
                cancellable(token, fs::ensure_dir(&dest))
                    .await?
                    .map_err(|e| ExtractError::fs(&dest, e))?;
                summary.directories += 1;
            } else {
                if !written_paths.insert(dest.clone()) {
                    warn!(entry = %event.name, "duplicate entry, later entry replaces earlier one");
                }
                match self
                    .write_entry(token, archive, &raw, &event.name, &dest, create_links)
                    .await?
                {
                    Written::File => summary.files += 1,
                    Written::Symlink => summary.symlinks += 1,
                }
            }

            accounted += 1;
        }

        debug_assert_eq!(accounted, total);
        Ok(summary)
    }

    async fn write_entry<R: ReadAt>(
        &self,
        token: &CancellationToken,
        archive: &mut ArchiveReader<R>,
        raw: &RawEntry,
        name: &str,
        dest: &Path,
        create_links: bool,
    ) -> Result<Written> {
        // Directory entries are optional, so the parent may not exist yet.
        if let Some(parent) = dest.parent() {
            cancellable(token, fs::ensure_dir(parent))
                .await?
                .map_err(|e| ExtractError::fs(parent, e))?;
        }

        let mode = file_mode(raw.external_attributes);
        let symlink = is_symlink(mode);

        // Never write through a symlink left by an earlier entry or run.
        cancellable(token, fs::remove_existing(dest))
            .await?
            .map_err(|e| ExtractError::fs(dest, e))?;

        let mut stream = cancellable(token, archive.open_entry(raw))
            .await?
            .map_err(|e| ExtractError::entry_read(name, e))?;

        if symlink && create_links {
            let bytes = cancellable(token, stream.read_to_end())
                .await?
                .map_err(|e| ExtractError::entry_read(name, e))?;
            drop(stream);

            let link_target = String::from_utf8_lossy(&bytes);
            debug!(entry = %name, target = %link_target, "symlink");
            cancellable(token, fs::create_symlink(&link_target, dest))
                .await?
                .map_err(|e| ExtractError::fs(dest, e))?;
            return Ok(Written::Symlink);
        }

        let file_mode = if symlink {
            debug!(entry = %name, "writing symlink target as a plain file");
            DEFAULT_FILE_MODE
        } else {
            mode
        };
        debug!(entry = %name, mode = %format!("{file_mode:o}"), "file");

        let file = cancellable(token, fs::create_file(dest, file_mode))
            .await?
            .map_err(|e| ExtractError::fs(dest, e))?;

        let guard = self.state.begin_write(token, name);
        let copied = tokio::select! {
            biased;
            _ = guard.aborted() => Err(ExtractError::Canceled),
            result = copy_entry(stream, file, name, dest) => result,
        };
        drop(guard);

        copied.map(|_| Written::File)
    }
}

/// Copy a decompressed entry into `file`.
///
/// The entry stream is released as soon as the data ends so the reader can
/// move on; the file flush is awaited afterwards.
async fn copy_entry<R: ReadAt>(
    mut stream: EntryStream<'_, R>,
    mut file: tokio::fs::File,
    name: &str,
    dest: &Path,
) -> Result<u64> {
    let mut written = 0u64;
    while let Some(chunk) = stream
        .next_chunk()
        .await
        .map_err(|e| ExtractError::entry_read(name, e))?
    {
        file.write_all(chunk)
            .await
            .map_err(|e| ExtractError::fs(dest, e))?;
        written += chunk.len() as u64;
    }
    drop(stream);

    file.flush().await.map_err(|e| ExtractError::fs(dest, e))?;
    Ok(written)
}

/// Run `fut` unless the token fires first.
async fn cancellable<F: Future>(token: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ExtractError::Canceled),
        output = fut => Ok(output),
    }
}

async fn open_local(path: &Path) -> std::result::Result<ArchiveReader<LocalFileReader>, ArchiveError> {
    let source = LocalFileReader::open(path).await?;
    ArchiveReader::open(Arc::new(source)).await
}
