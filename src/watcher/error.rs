//! Error types for the watch registry and event loop.

use std::path::PathBuf;
use thiserror::Error;

use super::WatchHandle;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watch source: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Watch registry is full ({limit} watches)")]
    CapacityExceeded { limit: usize },

    #[error("Failed to read events from watch source: {source}")]
    ReadFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("No root directory could be watched")]
    NothingWatched,
}

/// Errors from [`WatchRegistry`](super::WatchRegistry) mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Watch registry is full ({limit} watches), cannot track handle {handle}")]
    CapacityExceeded { handle: WatchHandle, limit: usize },
}

impl From<RegistryError> for WatchError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::CapacityExceeded { limit, .. } => WatchError::CapacityExceeded { limit },
        }
    }
}
