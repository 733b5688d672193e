//! Recursive watch installation.
//!
//! `pin` walks a directory tree depth-first, pre-order, installing a watch
//! on each directory before its children are enumerated. Sibling order is
//! whatever the directory listing yields. Symbolic links are never
//! followed below the root, which rules out cycles.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::error::WatchError;
use super::event::WatchHandle;
use super::registry::WatchRegistry;
use super::source::WatchSource;

/// Summary of one `pin` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PinReport {
    /// Handle of the walk root, if it ended up watched.
    pub root: Option<WatchHandle>,
    /// Directories that received a new watch.
    pub watched: usize,
    /// Directories that were already watched.
    pub already_watched: usize,
    /// Directories skipped (with their subtree) because they could not be
    /// read or watched.
    pub skipped: usize,
    /// Regular files seen during the walk, when collection is enabled.
    pub files: Vec<PathBuf>,
}

/// Outcome of installing a single watch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Installed {
    New(WatchHandle),
    Existing(WatchHandle),
}

/// Installs watches over whole directory trees.
#[derive(Debug, Default, Clone)]
pub struct DirectoryWalker {
    collect_files: bool,
}

impl DirectoryWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also report the regular files found under the walked tree.
    pub fn collect_files(mut self, collect: bool) -> Self {
        self.collect_files = collect;
        self
    }

    /// Watch `root` and every directory below it.
    ///
    /// Failures are per subtree: a directory that cannot be opened or
    /// watched is logged and skipped, and the walk continues with its
    /// siblings.
    pub fn pin<S: WatchSource + ?Sized>(
        &self,
        source: &mut S,
        registry: &mut WatchRegistry,
        root: &Path,
    ) -> PinReport {
        let mut report = PinReport::default();

        let root = match resolve_root(root) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("[walker] skipping {}: {e}", root.display());
                report.skipped += 1;
                return report;
            }
        };
        let root = root.as_path();

        let mut entries = WalkDir::new(root).follow_links(false).into_iter();
        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    tracing::warn!("[walker] cannot read {}: {e}", path.display());
                    report.skipped += 1;
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                match install(source, registry, entry.path()) {
                    Ok(Installed::New(handle)) => {
                        crate::log_event!("watcher", "watching", "{}", entry.path().display());
                        if entry.depth() == 0 {
                            report.root = Some(handle);
                        }
                        report.watched += 1;
                    }
                    Ok(Installed::Existing(handle)) => {
                        crate::debug_event!(
                            "watcher",
                            "already watching",
                            "{} ({handle})",
                            entry.path().display()
                        );
                        if entry.depth() == 0 {
                            report.root = Some(handle);
                        }
                        report.already_watched += 1;
                    }
                    Err(e) => {
                        tracing::warn!("[watcher] {e}");
                        report.skipped += 1;
                        entries.skip_current_dir();
                    }
                }
            } else if entry.depth() == 0 {
                tracing::warn!("[walker] not a directory, skipping: {}", root.display());
                report.skipped += 1;
            } else if self.collect_files && file_type.is_file() {
                report.files.push(entry.into_path());
            }
        }

        report
    }
}

/// Canonical path of a walk root. A root that is itself a symlink is
/// watched at its target, since watches never follow links.
fn resolve_root(root: &Path) -> io::Result<PathBuf> {
    let resolved = std::fs::canonicalize(root)?;
    if !resolved.is_dir() {
        return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
    }
    Ok(resolved)
}

/// Install one watch and record it, never leaving an untracked OS watch.
fn install<S: WatchSource + ?Sized>(
    source: &mut S,
    registry: &mut WatchRegistry,
    dir: &Path,
) -> Result<Installed, WatchError> {
    if registry.is_full() && registry.handle_for(dir).is_none() {
        return Err(WatchError::CapacityExceeded {
            limit: registry.limit(),
        });
    }

    let handle = source
        .add_watch(dir)
        .map_err(|e| WatchError::PathWatchFailed {
            path: dir.to_path_buf(),
            reason: describe_watch_error(&e),
        })?;

    match registry.insert(handle, dir) {
        Ok(None) => Ok(Installed::New(handle)),
        Ok(Some(previous)) => {
            if previous != dir {
                crate::debug_event!(
                    "watcher",
                    "rebound",
                    "{handle} {} -> {}",
                    previous.display(),
                    dir.display()
                );
            }
            Ok(Installed::Existing(handle))
        }
        Err(e) => {
            if let Err(rm) = source.remove_watch(handle) {
                tracing::warn!("[watcher] failed to release untracked {handle}: {rm}");
            }
            Err(e.into())
        }
    }
}

fn describe_watch_error(e: &io::Error) -> String {
    match e.raw_os_error() {
        Some(libc::ENOSPC) => {
            format!("{e} (inotify watch limit reached, see fs.inotify.max_user_watches)")
        }
        Some(libc::EMFILE) => {
            format!("{e} (inotify instance limit reached, see fs.inotify.max_user_instances)")
        }
        _ => e.to_string(),
    }
}
