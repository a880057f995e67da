//! Path normalization and root-boundary checks.

use std::path::{Component, Path, PathBuf};

/// Lexically cleans a slash-separated URL path.
///
/// Collapses repeated slashes, resolves `.` and `..` segments (bounded at
/// the root for rooted paths) and drops any trailing slash. The empty path
/// cleans to `.` and a rooted path always keeps its leading slash.
pub fn clean_url_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(last) if *last != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }

    let joined = out.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Ensures `target` starts with a slash.
pub fn ensure_slash_start(target: &str) -> String {
    if target.starts_with('/') {
        target.to_string()
    } else {
        format!("/{target}")
    }
}

/// Normalizes a pattern the way configured sources are interpreted: rooted
/// at `/`, with a leading `!` surviving in front of the slash.
pub fn slasher(value: &str) -> String {
    if let Some(rest) = value.strip_prefix('!') {
        format!("!{}", clean_url_path(&ensure_slash_start(rest)))
    } else {
        clean_url_path(&ensure_slash_start(value))
    }
}

/// Lexically normalizes a filesystem path, resolving `.` and `..` without
/// touching the filesystem. `..` at the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Reports whether `path` lies within `parent`.
///
/// Both sides are compared after stripping trailing separators; the check is
/// a prefix check on normalized paths, case-insensitive on Windows.
pub fn path_is_inside(path: &Path, parent: &Path) -> bool {
    let path = strip_trailing_sep(&path.to_string_lossy());
    let parent = strip_trailing_sep(&parent.to_string_lossy());

    #[cfg(windows)]
    let (path, parent) = (path.to_lowercase(), parent.to_lowercase());

    let plen = parent.len();
    path.starts_with(&*parent)
        && (path.len() == plen || path[plen..].starts_with(std::path::MAIN_SEPARATOR))
}

fn strip_trailing_sep(path: &str) -> String {
    path.trim_end_matches(std::path::MAIN_SEPARATOR).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_url_path() {
        assert_eq!(clean_url_path("/a/b/c"), "/a/b/c");
        assert_eq!(clean_url_path("/a//b"), "/a/b");
        assert_eq!(clean_url_path("/a/./b"), "/a/b");
        assert_eq!(clean_url_path("/a/b/../c"), "/a/c");
        assert_eq!(clean_url_path("/../a"), "/a");
        assert_eq!(clean_url_path("/a/b/"), "/a/b");
        assert_eq!(clean_url_path("/"), "/");
        assert_eq!(clean_url_path(""), ".");
        assert_eq!(clean_url_path("a/../.."), "..");
    }

    #[test]
    fn test_ensure_slash_start() {
        assert_eq!(ensure_slash_start("about"), "/about");
        assert_eq!(ensure_slash_start("/about"), "/about");
    }

    #[test]
    fn test_slasher() {
        assert_eq!(slasher("app/**"), "/app/**");
        assert_eq!(slasher("/app/**"), "/app/**");
        assert_eq!(slasher("!secret/*"), "!/secret/*");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/pub/a/../b")), PathBuf::from("/pub/b"));
        assert_eq!(normalize(Path::new("/pub/../../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize(Path::new("/pub/./x")), PathBuf::from("/pub/x"));
    }

    #[test]
    fn test_path_is_inside() {
        assert!(path_is_inside(Path::new("/pub/index.html"), Path::new("/pub")));
        assert!(path_is_inside(Path::new("/pub"), Path::new("/pub")));
        assert!(path_is_inside(Path::new("/pub/"), Path::new("/pub")));
        assert!(!path_is_inside(Path::new("/etc/passwd"), Path::new("/pub")));
        // /public-html must not count as inside /public
        assert!(!path_is_inside(Path::new("/public-html/x"), Path::new("/public")));
    }
}
