//! Watch registry: the handle to path table owned by the dispatcher.
//!
//! Every directory watch the dispatcher installs is recorded here so that
//! events, which only carry a handle and a child name, can be resolved to
//! absolute paths. The table never holds a handle whose removal has been
//! requested.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use super::error::RegistryError;
use super::event::WatchHandle;

/// Default upper bound on tracked watches.
pub const DEFAULT_MAX_WATCHES: usize = 1024;

/// Mapping from watch handle to the absolute directory path it covers.
///
/// Insertion order is kept, but removal compacts by swapping the last entry
/// into the hole, so callers must not rely on ordering.
#[derive(Debug)]
pub struct WatchRegistry {
    entries: IndexMap<WatchHandle, PathBuf>,
    limit: usize,
}

impl WatchRegistry {
    /// Create an empty registry that tracks at most `limit` watches.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            limit,
        }
    }

    /// Record `handle` as covering `path`.
    ///
    /// If `handle` is already tracked its path is replaced and the previous
    /// path returned; the kernel hands back the same handle when a watched
    /// directory is watched again. A new handle is rejected once the
    /// registry holds `limit` entries.
    pub fn insert(
        &mut self,
        handle: WatchHandle,
        path: impl Into<PathBuf>,
    ) -> Result<Option<PathBuf>, RegistryError> {
        if let Some(existing) = self.entries.get_mut(&handle) {
            return Ok(Some(std::mem::replace(existing, path.into())));
        }

        if self.is_full() {
            return Err(RegistryError::CapacityExceeded {
                handle,
                limit: self.limit,
            });
        }

        self.entries.insert(handle, path.into());
        Ok(None)
    }

    /// Resolve a handle to its directory.
    pub fn lookup(&self, handle: WatchHandle) -> Option<&Path> {
        self.entries.get(&handle).map(PathBuf::as_path)
    }

    /// Find the handle watching exactly `path`.
    pub fn handle_for(&self, path: &Path) -> Option<WatchHandle> {
        self.entries
            .iter()
            .find(|(_, p)| p.as_path() == path)
            .map(|(handle, _)| *handle)
    }

    /// Forget a handle, returning the path it covered.
    ///
    /// Removing an unknown handle is a no-op that returns `None`.
    pub fn remove(&mut self, handle: WatchHandle) -> Option<PathBuf> {
        self.entries.swap_remove(&handle)
    }

    /// Drain every entry, e.g. at shutdown so each OS watch can be removed.
    pub fn clear(&mut self) -> Vec<(WatchHandle, PathBuf)> {
        self.entries.drain(..).collect()
    }

    pub fn contains(&self, handle: WatchHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// True once no new handle can be accepted.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.limit
    }

    /// Iterate over `(handle, path)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (WatchHandle, &Path)> {
        self.entries.iter().map(|(h, p)| (*h, p.as_path()))
    }
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WATCHES)
    }
}
