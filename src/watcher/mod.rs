//! Recursive directory watching.
//!
//! # Architecture
//!
//! ```text
//! EventDispatcher (owns everything, single thread)
//!   - WatchSource (inotify fd: install, remove, read)
//!   - WatchRegistry (handle -> absolute path)
//!   - DirectoryWalker (pin: watch a tree, pre-order)
//!   - QuarantinePolicy (delete or move unwanted files)
//! ```
//!
//! The dispatcher reads a batch, decodes it, and for each record either
//! pins a new directory, hands a new file to the policy, or retires a
//! handle. The registry always mirrors the set of installed OS watches.

mod dispatcher;
mod error;
mod event;
mod inotify;
mod registry;
mod source;
mod walker;

pub use dispatcher::{Dispatch, DispatchState, DispatchStats, EventDispatcher};
pub use error::{RegistryError, WatchError};
pub use event::{EventMask, HEADER_LEN, MAX_RECORD_LEN, NAME_MAX, WatchEvent, WatchHandle, decode_batch};
pub use inotify::InotifySource;
pub use registry::{DEFAULT_MAX_WATCHES, WatchRegistry};
pub use source::WatchSource;
pub use walker::{DirectoryWalker, PinReport};
