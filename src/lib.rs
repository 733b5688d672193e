//! Recursive directory watchdog.
//!
//! Watches directory trees with inotify, follows new subdirectories as they
//! are created, and deletes or quarantines newly created files whose
//! extension is on a denylist.

pub mod cli;
pub mod config;
pub mod logging;
pub mod quarantine;
pub mod shutdown;
pub mod utils;
pub mod watcher;

pub use config::Settings;
pub use quarantine::{QuarantineError, QuarantineOutcome, QuarantinePolicy, UnwantedExtensions};
pub use watcher::{
    DirectoryWalker, Dispatch, DispatchState, EventDispatcher, InotifySource, WatchError,
    WatchHandle, WatchRegistry, WatchSource,
};
