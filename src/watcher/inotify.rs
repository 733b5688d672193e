//! inotify(7)-backed [`WatchSource`].

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use super::error::WatchError;
use super::event::{EventMask, MAX_RECORD_LEN, WatchEvent, WatchHandle, decode_batch};
use super::source::WatchSource;

/// A single inotify instance shared by the walker (installs) and the
/// dispatcher (reads). Closed when dropped.
#[derive(Debug)]
pub struct InotifySource {
    fd: OwnedFd,
    buffer: Vec<u8>,
}

impl InotifySource {
    /// Create an inotify instance whose read buffer holds `buffer_events`
    /// maximal records.
    pub fn new(buffer_events: usize) -> Result<Self, WatchError> {
        // SAFETY: inotify_init1 takes no pointers; the flags are valid.
        let raw = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if raw < 0 {
            return Err(WatchError::InitFailed {
                reason: io::Error::last_os_error().to_string(),
            });
        }

        // SAFETY: `raw` is a freshly created descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        Ok(Self {
            fd,
            buffer: vec![0u8; buffer_events.max(1) * MAX_RECORD_LEN],
        })
    }

    /// Wait until the descriptor is readable or `timeout` elapses.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `pfd` is a valid pollfd and we pass a count of one.
        let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ready < 0 {
            return Err(io::Error::last_os_error());
        }
        if pfd.revents & libc::POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        Ok(ready > 0)
    }
}

impl WatchSource for InotifySource {
    fn add_watch(&mut self, path: &Path) -> io::Result<WatchHandle> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: `c_path` is a valid NUL-terminated string for the call.
        let wd = unsafe {
            libc::inotify_add_watch(
                self.fd.as_raw_fd(),
                c_path.as_ptr(),
                EventMask::watch_mask().bits(),
            )
        };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(WatchHandle::new(wd))
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        // SAFETY: plain integer arguments.
        let rc = unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), handle.as_raw()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn read_events(&mut self, timeout: Duration) -> io::Result<Vec<WatchEvent>> {
        if !self.wait_readable(timeout)? {
            return Ok(Vec::new());
        }

        // SAFETY: the buffer is valid for writes of its full length.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                self.buffer.as_mut_ptr().cast(),
                self.buffer.len(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        Ok(decode_batch(&self.buffer[..n as usize]))
    }
}
