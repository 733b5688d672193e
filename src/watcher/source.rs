//! The notification source seam.
//!
//! [`WatchSource`] is the black-box OS primitive: install a directory
//! watch, remove one, and read the next batch of events. The production
//! implementation is [`InotifySource`](super::InotifySource).

use std::io;
use std::path::Path;
use std::time::Duration;

use super::event::{WatchEvent, WatchHandle};

/// Low-level directory watch primitive.
///
/// Installing a watch on a directory that is already watched returns the
/// existing handle rather than a new one.
pub trait WatchSource {
    /// Install a create/delete watch on `path`.
    fn add_watch(&mut self, path: &Path) -> io::Result<WatchHandle>;

    /// Remove a previously installed watch.
    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()>;

    /// Block for at most `timeout` and return the next decoded batch.
    ///
    /// An empty batch means the timeout elapsed without events.
    fn read_events(&mut self, timeout: Duration) -> io::Result<Vec<WatchEvent>>;
}

impl<S: WatchSource + ?Sized> WatchSource for Box<S> {
    fn add_watch(&mut self, path: &Path) -> io::Result<WatchHandle> {
        (**self).add_watch(path)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        (**self).remove_watch(handle)
    }

    fn read_events(&mut self, timeout: Duration) -> io::Result<Vec<WatchEvent>> {
        (**self).read_events(timeout)
    }
}
