//! Extension extraction and the unwanted-extension set.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Text after the last `.` in a file name.
///
/// Returns `None` when the name has no dot or ends with one. Dotfiles are
/// not special: `.php` has the extension `php`.
pub fn extension_of(name: &OsStr) -> Option<&OsStr> {
    let bytes = name.as_bytes();
    let dot = bytes.iter().rposition(|b| *b == b'.')?;
    let ext = &bytes[dot + 1..];
    if ext.is_empty() {
        None
    } else {
        Some(OsStr::from_bytes(ext))
    }
}

/// Immutable set of denied extensions, stored without the leading dot and
/// compared ASCII case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnwantedExtensions {
    set: BTreeSet<String>,
}

impl UnwantedExtensions {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { set }
    }

    /// Whether `ext` (without dot) is denied.
    pub fn contains(&self, ext: &OsStr) -> bool {
        ext.to_str()
            .is_some_and(|ext| self.set.contains(&ext.to_ascii_lowercase()))
    }

    /// Whether the file name of `path` carries a denied extension.
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(extension_of)
            .is_some_and(|ext| self.contains(ext))
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.set.iter().map(String::as_str)
    }
}

impl fmt::Display for UnwantedExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for ext in &self.set {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, ".{ext}")?;
            first = false;
        }
        Ok(())
    }
}
