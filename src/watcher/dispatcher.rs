//! The event loop.
//!
//! [`EventDispatcher`] owns the watch source, the registry and the policy.
//! It alternates between waiting for a batch and decoding it; every record
//! is routed before the next read, so a directory created in one batch is
//! watched before any later batch is looked at.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::quarantine::{QuarantineOutcome, QuarantinePolicy};
use crate::utils::join_child;

use super::error::WatchError;
use super::event::{WatchEvent, WatchHandle};
use super::registry::WatchRegistry;
use super::source::WatchSource;
use super::walker::{DirectoryWalker, PinReport};

/// Default wait per read before the shutdown flag is checked again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Where the read loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    WaitingForEvents,
    DecodingBatch,
    /// Terminal. Entered on a shutdown request, an unrecoverable read
    /// error, or teardown.
    ShuttingDown,
}

/// Counters reported when the dispatcher shuts down.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    pub batches: u64,
    pub events: u64,
    pub directories_watched: u64,
    pub handles_retired: u64,
    pub files_quarantined: u64,
    pub quarantine_failures: u64,
    pub events_dropped: u64,
    pub read_errors: u64,
    pub overflows: u64,
}

impl fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events in {} batches, {} directories watched, {} retired, \
             {} files quarantined ({} failed), {} dropped, {} read errors, {} overflows",
            self.events,
            self.batches,
            self.directories_watched,
            self.handles_retired,
            self.files_quarantined,
            self.quarantine_failures,
            self.events_dropped,
            self.read_errors,
            self.overflows
        )
    }
}

/// What a single record led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A new directory (and its subtree) is now watched.
    Pinned {
        path: PathBuf,
        watched: usize,
        swept: usize,
    },
    /// The policy ran on a new file.
    Quarantined {
        path: PathBuf,
        outcome: QuarantineOutcome,
    },
    /// The policy failed on a new file; it is left where it is.
    QuarantineFailed { path: PathBuf },
    /// A new file that is not unwanted.
    Kept { path: PathBuf },
    /// A handle left the registry.
    Retired { handle: WatchHandle, path: PathBuf },
    /// The queue overflowed and the tree was re-pinned.
    Resynced { retired: usize, watched: usize },
    /// Nothing to do: unknown handle, no name, or an uninteresting flag.
    Dropped,
}

/// Single-threaded owner of the watch source, registry and policy.
pub struct EventDispatcher<S: WatchSource> {
    source: S,
    registry: WatchRegistry,
    policy: QuarantinePolicy,
    roots: Vec<PathBuf>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
    sweep_new_directories: bool,
    state: DispatchState,
    stats: DispatchStats,
    torn_down: bool,
}

impl<S: WatchSource> EventDispatcher<S> {
    pub fn new(source: S, registry: WatchRegistry, policy: QuarantinePolicy) -> Self {
        Self {
            source,
            registry,
            policy,
            roots: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            sweep_new_directories: true,
            state: DispatchState::WaitingForEvents,
            stats: DispatchStats::default(),
            torn_down: false,
        }
    }

    /// Use `flag` as the shutdown request, typically one wired to signals.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the policy over files already inside newly created directories.
    pub fn sweep_new_directories(mut self, sweep: bool) -> Self {
        self.sweep_new_directories = sweep;
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &QuarantinePolicy {
        &self.policy
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Watch a configured root and everything below it.
    ///
    /// Files already present are left alone. The root is remembered for
    /// resynchronisation only if it ended up watched.
    pub fn pin_root(&mut self, root: &Path) -> PinReport {
        let report = DirectoryWalker::new().pin(&mut self.source, &mut self.registry, root);
        self.stats.directories_watched += report.watched as u64;

        if report.root.is_some() && !self.roots.iter().any(|r| r == root) {
            self.roots.push(root.to_path_buf());
        }
        report
    }

    /// Read and dispatch batches until shutdown is requested.
    ///
    /// Read errors are logged and the loop continues, except for a closed
    /// or invalid source, which ends the loop with an error.
    pub fn run(&mut self) -> Result<(), WatchError> {
        if self.torn_down {
            return Ok(());
        }

        crate::log_event!(
            "dispatcher",
            "started",
            "{} directories under {} roots",
            self.registry.len(),
            self.roots.len()
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            self.state = DispatchState::WaitingForEvents;

            let batch = match self.source.read_events(self.poll_interval) {
                Ok(batch) => batch,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(libc::EBADF) => {
                    tracing::error!("[dispatcher] watch source is no longer readable: {e}");
                    self.state = DispatchState::ShuttingDown;
                    return Err(WatchError::ReadFailed { source: e });
                }
                Err(e) => {
                    tracing::warn!("[dispatcher] read error: {e}");
                    self.stats.read_errors += 1;
                    continue;
                }
            };

            if batch.is_empty() {
                continue;
            }

            self.state = DispatchState::DecodingBatch;
            self.stats.batches += 1;
            for event in &batch {
                self.dispatch(event);
            }
        }

        crate::log_event!("dispatcher", "shutdown requested");
        self.state = DispatchState::ShuttingDown;
        Ok(())
    }

    /// Route one decoded record.
    pub fn dispatch(&mut self, event: &WatchEvent) -> Dispatch {
        self.stats.events += 1;

        if event.is_overflow() {
            return self.resync();
        }
        if event.is_ignored() {
            return self.retire_released(event.handle);
        }
        if event.name().is_empty() {
            return self.drop_event(event, "no name");
        }

        let Some(parent) = self.registry.lookup(event.handle) else {
            return self.drop_event(event, "unknown handle");
        };
        let path = join_child(parent, event.name());

        if event.is_created() {
            if event.is_dir() {
                self.on_directory_created(path)
            } else {
                self.on_file_created(path)
            }
        } else if event.is_deleted() && event.is_dir() {
            self.on_directory_deleted(path)
        } else {
            self.drop_event(event, "not actionable")
        }
    }

    fn drop_event(&mut self, event: &WatchEvent, why: &str) -> Dispatch {
        crate::debug_event!(
            "dispatcher",
            "dropped",
            "{} {:?} {:?} ({why})",
            event.handle,
            event.mask,
            event.name()
        );
        self.stats.events_dropped += 1;
        Dispatch::Dropped
    }

    fn on_directory_created(&mut self, path: PathBuf) -> Dispatch {
        let report = DirectoryWalker::new()
            .collect_files(self.sweep_new_directories)
            .pin(&mut self.source, &mut self.registry, &path);
        self.stats.directories_watched += report.watched as u64;

        let swept = report.files.len();
        for file in report.files {
            self.on_file_created(file);
        }

        Dispatch::Pinned {
            path,
            watched: report.watched,
            swept,
        }
    }

    fn on_file_created(&mut self, path: PathBuf) -> Dispatch {
        if !self.policy.is_unwanted(&path) {
            crate::debug_event!("dispatcher", "kept", "{}", path.display());
            return Dispatch::Kept { path };
        }

        match self.policy.apply(&path) {
            Ok(outcome) => {
                match &outcome {
                    QuarantineOutcome::Deleted => {
                        crate::log_event!("quarantine", "deleted", "{}", path.display());
                        self.stats.files_quarantined += 1;
                    }
                    QuarantineOutcome::Moved { to } => {
                        crate::log_event!(
                            "quarantine",
                            "moved",
                            "{} -> {}",
                            path.display(),
                            to.display()
                        );
                        self.stats.files_quarantined += 1;
                    }
                    QuarantineOutcome::Vanished => {
                        crate::debug_event!("quarantine", "vanished", "{}", path.display());
                    }
                }
                Dispatch::Quarantined { path, outcome }
            }
            Err(e) => {
                tracing::warn!("[quarantine] {e}");
                self.stats.quarantine_failures += 1;
                Dispatch::QuarantineFailed { path }
            }
        }
    }

    fn on_directory_deleted(&mut self, path: PathBuf) -> Dispatch {
        let Some(handle) = self.registry.handle_for(&path) else {
            crate::debug_event!("dispatcher", "untracked delete", "{}", path.display());
            self.stats.events_dropped += 1;
            return Dispatch::Dropped;
        };

        // Recreated under the same name: the stale handle is released by
        // the kernel and retired on IN_IGNORED.
        if path.is_dir() {
            crate::debug_event!("dispatcher", "recreated", "{} ({handle})", path.display());
            return Dispatch::Dropped;
        }

        self.retire(handle)
    }

    /// Drop `handle` from the registry and release its OS watch.
    fn retire(&mut self, handle: WatchHandle) -> Dispatch {
        let Some(path) = self.registry.remove(handle) else {
            self.stats.events_dropped += 1;
            return Dispatch::Dropped;
        };

        // The kernel may have released it already.
        if let Err(e) = self.source.remove_watch(handle) {
            crate::debug_event!("dispatcher", "release", "{handle}: {e}");
        }

        crate::log_event!("watcher", "unwatched", "{}", path.display());
        self.stats.handles_retired += 1;
        Dispatch::Retired { handle, path }
    }

    /// The kernel already dropped `handle`; only the registry is updated.
    fn retire_released(&mut self, handle: WatchHandle) -> Dispatch {
        match self.registry.remove(handle) {
            Some(path) => {
                crate::log_event!("watcher", "released", "{}", path.display());
                self.stats.handles_retired += 1;
                Dispatch::Retired { handle, path }
            }
            None => {
                crate::debug_event!("dispatcher", "released untracked", "{handle}");
                self.stats.events_dropped += 1;
                Dispatch::Dropped
            }
        }
    }

    /// Recover from a queue overflow: forget directories that are gone and
    /// re-pin every root to pick up directories created meanwhile.
    fn resync(&mut self) -> Dispatch {
        tracing::warn!("[dispatcher] event queue overflowed, resynchronising watches");
        self.stats.overflows += 1;

        let stale: Vec<WatchHandle> = self
            .registry
            .iter()
            .filter(|(_, path)| !path.is_dir())
            .map(|(handle, _)| handle)
            .collect();
        let retired = stale.len();
        for handle in stale {
            self.retire(handle);
        }

        let mut watched = 0;
        for root in self.roots.clone() {
            let report = DirectoryWalker::new().pin(&mut self.source, &mut self.registry, &root);
            watched += report.watched;
        }
        self.stats.directories_watched += watched as u64;

        crate::log_event!(
            "dispatcher",
            "resynchronised",
            "{retired} retired, {watched} newly watched"
        );
        Dispatch::Resynced { retired, watched }
    }

    /// Release every watch and stop. Safe to call more than once; only the
    /// first call does anything. Returns the number of watches released.
    pub fn teardown(&mut self) -> usize {
        if self.torn_down {
            return 0;
        }
        self.torn_down = true;
        self.state = DispatchState::ShuttingDown;

        let entries = self.registry.clear();
        for (handle, path) in &entries {
            if let Err(e) = self.source.remove_watch(*handle) {
                crate::debug_event!("dispatcher", "release", "{handle} {}: {e}", path.display());
            }
        }

        crate::log_event!(
            "dispatcher",
            "stopped",
            "released {} watches; {}",
            entries.len(),
            self.stats
        );
        entries.len()
    }
}

impl<S: WatchSource> Drop for EventDispatcher<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
