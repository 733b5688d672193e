//! Deleting or relocating unwanted files.

use std::ffi::{CString, OsStr, OsString};
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, symlink};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::extension::UnwantedExtensions;
use crate::utils::{is_within, join_child};

/// Errors from a quarantine action. Always recoverable for the caller.
#[derive(Error, Debug)]
pub enum QuarantineError {
    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Path has no file name: {path}")]
    NoFileName { path: PathBuf },
}

/// What happened to a quarantined path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineOutcome {
    Deleted,
    Moved { to: PathBuf },
    /// The path was gone before the action ran.
    Vanished,
}

/// Decides whether a file is unwanted and deletes it or moves it into the
/// quarantine directory.
#[derive(Debug, Clone)]
pub struct QuarantinePolicy {
    extensions: UnwantedExtensions,
    target: Option<PathBuf>,
}

impl QuarantinePolicy {
    /// Delete matched files.
    pub fn delete(extensions: UnwantedExtensions) -> Self {
        Self {
            extensions,
            target: None,
        }
    }

    /// Move matched files into `target` instead of deleting them.
    ///
    /// An existing `target` is canonicalised so that paths reported under
    /// canonical watch roots are recognised as inside it.
    pub fn move_to(extensions: UnwantedExtensions, target: impl Into<PathBuf>) -> Self {
        Self {
            extensions,
            target: Some(resolve_dir(target.into())),
        }
    }

    pub fn new(extensions: UnwantedExtensions, target: Option<PathBuf>) -> Self {
        Self {
            extensions,
            target: target.map(resolve_dir),
        }
    }

    pub fn extensions(&self) -> &UnwantedExtensions {
        &self.extensions
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// True for paths inside the quarantine directory.
    pub fn is_quarantined(&self, path: &Path) -> bool {
        self.target.as_deref().is_some_and(|dir| is_within(path, dir))
    }

    /// True when `path` should be acted upon.
    pub fn is_unwanted(&self, path: &Path) -> bool {
        !self.is_quarantined(path) && self.extensions.matches(path)
    }

    /// Delete `path`, or move it into the quarantine directory.
    ///
    /// On a name collision in the quarantine directory the first free name
    /// among `name.1`, `name.2`, ... is used; nothing is overwritten, even
    /// when a file appears under the chosen name concurrently.
    pub fn apply(&self, path: &Path) -> Result<QuarantineOutcome, QuarantineError> {
        if fs::symlink_metadata(path).is_err() {
            return Ok(QuarantineOutcome::Vanished);
        }

        match &self.target {
            None => match fs::remove_file(path) {
                Ok(()) => Ok(QuarantineOutcome::Deleted),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(QuarantineOutcome::Vanished),
                Err(source) => Err(QuarantineError::Delete {
                    path: path.to_path_buf(),
                    source,
                }),
            },
            Some(dir) => {
                let name = path.file_name().ok_or_else(|| QuarantineError::NoFileName {
                    path: path.to_path_buf(),
                })?;
                match move_into(path, dir, name) {
                    Ok((to, Placed::Moved)) => Ok(QuarantineOutcome::Moved { to }),
                    Ok((_, Placed::Removed)) => Ok(QuarantineOutcome::Deleted),
                    Err((to, e)) if e.kind() == io::ErrorKind::NotFound && !dir.is_dir() => {
                        Err(QuarantineError::Move {
                            from: path.to_path_buf(),
                            to,
                            source: e,
                        })
                    }
                    Err((_, e)) if e.kind() == io::ErrorKind::NotFound => {
                        Ok(QuarantineOutcome::Vanished)
                    }
                    Err((to, source)) => Err(QuarantineError::Move {
                        from: path.to_path_buf(),
                        to,
                        source,
                    }),
                }
            }
        }
    }
}

/// Canonical form of an existing directory, or the path unchanged.
fn resolve_dir(dir: PathBuf) -> PathBuf {
    fs::canonicalize(&dir).unwrap_or(dir)
}

/// How a file left its original location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placed {
    Moved,
    /// A special file that cannot be carried across filesystems was
    /// removed instead.
    Removed,
}

/// `name`, `name.1`, `name.2`, ...
fn candidate(dir: &Path, name: &OsStr, counter: u64) -> PathBuf {
    if counter == 0 {
        return join_child(dir, name);
    }
    let mut suffixed = OsString::from(name);
    suffixed.push(format!(".{counter}"));
    join_child(dir, &suffixed)
}

/// Move `from` into `dir` under the first name nobody holds, claiming the
/// name atomically so a concurrent arrival is never overwritten.
fn move_into(
    from: &Path,
    dir: &Path,
    name: &OsStr,
) -> Result<(PathBuf, Placed), (PathBuf, io::Error)> {
    let mut counter: u64 = 0;
    loop {
        let to = candidate(dir, name, counter);
        match place(from, &to) {
            Ok(placed) => return Ok((to, placed)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err((to, e)),
        }
    }
}

/// Move one file to `to`, failing with `AlreadyExists` if `to` is taken.
fn place(from: &Path, to: &Path) -> io::Result<Placed> {
    match rename_noreplace(from, to) {
        Ok(()) => Ok(Placed::Moved),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => move_across_devices(from, to),
        // Kernel or filesystem without RENAME_NOREPLACE.
        Err(e) if matches!(e.raw_os_error(), Some(libc::EINVAL | libc::ENOSYS)) => {
            match fs::hard_link(from, to) {
                Ok(()) => fs::remove_file(from).map(|()| Placed::Moved),
                Err(e) if e.raw_os_error() == Some(libc::EXDEV) => move_across_devices(from, to),
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// `RENAME_NOREPLACE` from `<linux/fs.h>`.
const RENAME_NOREPLACE: libc::c_uint = 1;

/// rename(2) that refuses to replace an existing destination.
fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    let from = CString::new(from.as_os_str().as_bytes())?;
    let to = CString::new(to.as_os_str().as_bytes())?;

    // SAFETY: both paths are valid NUL-terminated strings for the call and
    // the remaining arguments are plain integers.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_renameat2,
            libc::AT_FDCWD,
            from.as_ptr(),
            libc::AT_FDCWD,
            to.as_ptr(),
            RENAME_NOREPLACE,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Cross-filesystem fallback. Never opens anything but a regular file, so
/// FIFOs and devices cannot block and symlink targets are never read.
fn move_across_devices(from: &Path, to: &Path) -> io::Result<Placed> {
    let meta = fs::symlink_metadata(from)?;
    let file_type = meta.file_type();

    if file_type.is_symlink() {
        symlink(fs::read_link(from)?, to)?;
        fs::remove_file(from)?;
        return Ok(Placed::Moved);
    }

    if !file_type.is_file() {
        tracing::warn!(
            "[quarantine] {} is not a regular file and cannot be moved across filesystems, removing it",
            from.display()
        );
        fs::remove_file(from)?;
        return Ok(Placed::Removed);
    }

    let mut source = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK)
        .open(from)?;
    if !source.metadata()?.is_file() {
        // Swapped for something else since the check above.
        return Err(io::Error::from_raw_os_error(libc::EINVAL));
    }

    let mut dest = OpenOptions::new().write(true).create_new(true).open(to)?;
    let copied = io::copy(&mut source, &mut dest)
        .and_then(|_| dest.set_permissions(meta.permissions()));
    if let Err(e) = copied {
        let _ = fs::remove_file(to);
        return Err(e);
    }

    fs::remove_file(from)?;
    Ok(Placed::Moved)
}
