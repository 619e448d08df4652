//! Path and string utilities used by the engine and the template helpers.
//!
//! These operate on strings because config values are strings; the
//! engine-facing variants that take `Path` live at the bottom.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.` components, resolve `..` against
/// preceding normal components, never escape the root.
pub fn normalize(path: &str) -> String {
    normalize_path(Path::new(path)).display().to_string()
}

pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Join two paths; an absolute right-hand side replaces the left.
pub fn join_path(lhs: &str, rhs: &str) -> String {
    Path::new(lhs).join(rhs).display().to_string()
}

/// Make a path absolute against `base` (or the process cwd), normalized.
pub fn make_absolute(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Strip `base` off the front of `path`.
///
/// Plain string manipulation on purpose: `Path::strip_prefix` balks at
/// symlinked prefixes and `..`-laden results behave surprisingly. Paths
/// that don't start with `base` come back unchanged.
pub fn rel_path(path: &str, base: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    if path == base {
        return ".".to_string();
    }
    let prefix = format!("{}/", base.trim_end_matches('/'));
    match path.strip_prefix(&prefix) {
        Some(rest) => rest.to_string(),
        None => path.to_string(),
    }
}

/// Replace the file extension. `new_ext` includes the leading dot.
pub fn swap_ext(path: &str, new_ext: &str) -> String {
    let p = Path::new(path);
    let stem = match p.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => return format!("{path}{new_ext}"),
    };
    let name = format!("{stem}{new_ext}");
    match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.join(name).display().to_string()
        }
        _ => name,
    }
}

/// Basename with the extension removed.
pub fn stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/./b/../c"), "a/c");
        assert_eq!(normalize("/a/../../b"), "/b");
        assert_eq!(normalize("../x"), "../x");
        assert_eq!(normalize("./"), ".");
    }

    #[test]
    fn test_join_path_absolute_rhs_wins() {
        assert_eq!(join_path("/base", "sub/file.c"), "/base/sub/file.c");
        assert_eq!(join_path("/base", "/abs/file.c"), "/abs/file.c");
    }

    #[test]
    fn test_rel_path() {
        assert_eq!(rel_path("/a/b/c.txt", "/a/b"), "c.txt");
        assert_eq!(rel_path("/a/b", "/a/b"), ".");
        assert_eq!(rel_path("/other/c.txt", "/a/b"), "/other/c.txt");
    }

    #[test]
    fn test_swap_ext() {
        assert_eq!(swap_ext("src/main.cpp", ".o"), "src/main.o");
        assert_eq!(swap_ext("main", ".o"), "main.o");
        assert_eq!(swap_ext("a/b.tar.gz", ".zip"), "a/b.tar.zip");
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("src/util.cpp"), "util");
        assert_eq!(stem("noext"), "noext");
    }
}
