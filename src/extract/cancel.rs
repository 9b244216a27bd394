//! Cancellation state shared between an extraction and [`CancelHandle`]s.
//!
//! One token per extraction, replaced on every run. At most one in-flight
//! write is registered at a time, matching the one-entry-at-a-time rule.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

use crate::zip::ArchiveCloser;

#[derive(Default)]
struct Inner {
    token: CancellationToken,
    in_flight: Option<InFlightWrite>,
    archive: Option<ArchiveCloser>,
    generation: u64,
}

struct InFlightWrite {
    entry: String,
    abort: CancellationToken,
    generation: u64,
}

#[derive(Default)]
pub(crate) struct CancelState {
    inner: Mutex<Inner>,
}

impl CancelState {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new run: fresh token, empty slots.
    pub(crate) fn reset(&self) -> CancellationToken {
        let mut inner = self.lock();
        inner.token = CancellationToken::new();
        inner.in_flight = None;
        inner.archive = None;
        inner.token.clone()
    }

    pub(crate) fn cancel(&self) {
        let (in_flight, archive) = {
            let mut inner = self.lock();
            inner.token.cancel();
            (inner.in_flight.take(), inner.archive.clone())
        };

        if let Some(write) = in_flight {
            debug!(entry = %write.entry, "aborting in-flight write");
            write.abort.cancel();
        }
        if let Some(closer) = archive {
            closer.close();
        }
    }

    pub(crate) fn register_archive(&self, closer: ArchiveCloser) {
        self.lock().archive = Some(closer);
    }

    pub(crate) fn clear_archive(&self) {
        self.lock().archive = None;
    }

    /// Register the write of `entry` as the single abortable operation.
    pub(crate) fn begin_write(self: &Arc<Self>, token: &CancellationToken, entry: &str) -> WriteGuard {
        let abort = token.child_token();
        let mut inner = self.lock();
        inner.generation += 1;
        let generation = inner.generation;
        debug_assert!(inner.in_flight.is_none(), "two writes in flight");
        inner.in_flight = Some(InFlightWrite {
            entry: entry.to_string(),
            abort: abort.clone(),
            generation,
        });
        WriteGuard {
            state: Arc::clone(self),
            abort,
            generation,
        }
    }

    #[cfg(test)]
    fn has_in_flight(&self) -> bool {
        self.lock().in_flight.is_some()
    }
}

/// Keeps a write registered; clears the slot when dropped.
pub(crate) struct WriteGuard {
    state: Arc<CancelState>,
    abort: CancellationToken,
    generation: u64,
}

impl WriteGuard {
    /// Resolves once the write has to be abandoned.
    pub(crate) fn aborted(&self) -> WaitForCancellationFuture<'_> {
        self.abort.cancelled()
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let mut inner = self.state.lock();
        if inner
            .in_flight
            .as_ref()
            .is_some_and(|write| write.generation == self.generation)
        {
            inner.in_flight = None;
        }
    }
}

/// Cancels the extraction running on an [`Extractor`](crate::Extractor).
///
/// Cheap to clone and usable from any task. Cancelling when nothing is
/// running does nothing; the next extraction starts with a fresh token.
#[derive(Clone)]
pub struct CancelHandle {
    pub(crate) state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancel();
    }
}
