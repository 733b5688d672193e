//! Raw watch events and batch decoding.
//!
//! A read from the notification source yields a packed byte buffer of
//! `inotify_event` records. Each record is a fixed 16-byte header
//! (`wd`, `mask`, `cookie`, `len`) followed by `len` bytes of NUL-padded
//! name. [`decode_batch`] walks that buffer with a cursor.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;

use bitflags::bitflags;

/// Size of the fixed `inotify_event` header.
pub const HEADER_LEN: usize = 16;

/// Longest file name the kernel reports.
pub const NAME_MAX: usize = 255;

/// Largest possible single record (header plus padded name).
pub const MAX_RECORD_LEN: usize = HEADER_LEN + NAME_MAX + 1;

/// Opaque identifier returned when a directory watch is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(i32);

impl WatchHandle {
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd:{}", self.0)
    }
}

bitflags! {
    /// Event flags carried by a raw record (and used as the watch mask).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const CREATE = libc::IN_CREATE;
        const DELETE = libc::IN_DELETE;
        const Q_OVERFLOW = libc::IN_Q_OVERFLOW;
        const IGNORED = libc::IN_IGNORED;
        const ONLYDIR = libc::IN_ONLYDIR;
        const DONT_FOLLOW = libc::IN_DONT_FOLLOW;
        const ISDIR = libc::IN_ISDIR;
    }
}

impl EventMask {
    /// Mask installed on every watched directory.
    pub fn watch_mask() -> Self {
        Self::CREATE | Self::DELETE | Self::ONLYDIR | Self::DONT_FOLLOW
    }
}

/// A decoded event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub handle: WatchHandle,
    pub mask: EventMask,
    pub name: OsString,
}

impl WatchEvent {
    pub fn new(handle: WatchHandle, mask: EventMask, name: impl Into<OsString>) -> Self {
        Self {
            handle,
            mask,
            name: name.into(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mask.contains(EventMask::ISDIR)
    }

    pub fn is_created(&self) -> bool {
        self.mask.contains(EventMask::CREATE)
    }

    pub fn is_deleted(&self) -> bool {
        self.mask.contains(EventMask::DELETE)
    }

    pub fn is_overflow(&self) -> bool {
        self.mask.contains(EventMask::Q_OVERFLOW)
    }

    pub fn is_ignored(&self) -> bool {
        self.mask.contains(EventMask::IGNORED)
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }
}

/// Decode every complete record in `buf`.
///
/// The cursor advances by `HEADER_LEN + len` per record. A trailing record
/// whose header or name runs past the end of the buffer ends decoding.
pub fn decode_batch(buf: &[u8]) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    let mut cursor = 0;

    while cursor + HEADER_LEN <= buf.len() {
        let header = &buf[cursor..cursor + HEADER_LEN];
        let wd = i32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
        let mask = u32::from_ne_bytes([header[4], header[5], header[6], header[7]]);
        // header[8..12] is the rename cookie, which we do not track.
        let len = u32::from_ne_bytes([header[12], header[13], header[14], header[15]]) as usize;

        let name_start = cursor + HEADER_LEN;
        let Some(name_end) = name_start.checked_add(len).filter(|end| *end <= buf.len()) else {
            tracing::warn!("[watcher] truncated event record at offset {cursor}, dropping rest of batch");
            break;
        };

        let raw_name = &buf[name_start..name_end];
        let name_len = raw_name.iter().position(|b| *b == 0).unwrap_or(raw_name.len());

        events.push(WatchEvent {
            handle: WatchHandle::new(wd),
            mask: EventMask::from_bits_retain(mask),
            name: OsStr::from_bytes(&raw_name[..name_len]).to_os_string(),
        });

        cursor = name_end;
    }

    events
}

/// Encode one record the way the kernel lays it out. Used by tests.
#[cfg(test)]
pub(crate) fn encode_record(handle: WatchHandle, mask: EventMask, name: &str) -> Vec<u8> {
    let padded = if name.is_empty() {
        0
    } else {
        (name.len() + 1).next_multiple_of(HEADER_LEN)
    };
    let mut out = Vec::with_capacity(HEADER_LEN + padded);
    out.extend_from_slice(&handle.as_raw().to_ne_bytes());
    out.extend_from_slice(&mask.bits().to_ne_bytes());
    out.extend_from_slice(&0u32.to_ne_bytes());
    out.extend_from_slice(&(padded as u32).to_ne_bytes());
    out.extend_from_slice(name.as_bytes());
    out.resize(HEADER_LEN + padded, 0);
    out
}
