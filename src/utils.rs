//! Path helpers shared by the walker, dispatcher and quarantine policy.

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Join a directory and a child name into one path.
///
/// A trailing separator on `base` does not produce a double separator.
/// Only the final normal component of `name` is used, so a name can never
/// escape `base`.
pub fn join_child(base: &Path, name: impl AsRef<OsStr>) -> PathBuf {
    let name = Path::new(name.as_ref());
    let mut path = base.to_path_buf();
    if let Some(Component::Normal(child)) = name.components().next_back() {
        path.push(child);
    }
    path
}

/// Make a user-supplied root absolute without resolving symlinks.
pub fn absolute_root(path: &Path) -> io::Result<PathBuf> {
    std::path::absolute(path)
}

/// True when `path` lies inside `dir` (or is `dir`), compared by component.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_join_child() {
        assert_eq!(join_child(Path::new("a/b"), "c"), PathBuf::from("a/b/c"));
        assert_eq!(join_child(Path::new("a/b/"), "c"), PathBuf::from("a/b/c"));
        assert_eq!(
            join_child(Path::new("a/b/"), "c").to_str(),
            Some("a/b/c"),
            "no double separator"
        );
        assert_eq!(
            join_child(Path::new("/watch"), "evil.php"),
            PathBuf::from("/watch/evil.php")
        );
    }

    #[test]
    fn test_join_child_keeps_name_inside_base() {
        assert_eq!(join_child(Path::new("/a"), "/etc"), PathBuf::from("/a/etc"));
        assert_eq!(join_child(Path::new("/a"), "x/y"), PathBuf::from("/a/y"));
    }

    #[test]
    fn test_absolute_root() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute_root(Path::new("data")).unwrap(), cwd.join("data"));
        assert_eq!(
            absolute_root(Path::new("/already/abs")).unwrap(),
            PathBuf::from("/already/abs")
        );
    }

    #[test]
    fn test_is_within() {
        assert!(is_within(Path::new("/q/evil.php"), Path::new("/q")));
        assert!(!is_within(Path::new("/q2/evil.php"), Path::new("/q")));
    }
}
