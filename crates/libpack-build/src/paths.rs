//! Lexical path helpers
//!
//! Nothing here touches the filesystem: containment checks must hold for
//! paths that do not exist yet (asset outputs, destination directories).

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without consulting the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Whether `path` lies inside `root` (or is `root` itself)
pub fn is_within(root: &Path, path: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}

/// Join a user-supplied path below `root`
///
/// A leading `/` does not escape the root: `/assets` under `/src` is
/// `/src/assets`. Parent components are kept, so containment still has to be
/// checked with [`is_within`].
pub fn join_under(root: &Path, path: &str) -> PathBuf {
    let relative = path.trim_start_matches(|c: char| c == '/' || c == '\\');
    normalize(&root.join(relative))
}

/// Forward-slash path of `target` relative to the directory `base`
pub fn relative_unix(base: &Path, target: &Path) -> String {
    let relative = pathdiff::diff_paths(target, base).unwrap_or_else(|| target.to_path_buf());
    to_unix(&relative)
}

/// Render a path with forward slashes
pub fn to_unix(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Canonical node identifier for a file
pub fn file_url(path: &Path) -> String {
    let unix = to_unix(&normalize(path));
    if unix.starts_with('/') {
        format!("file://{}", unix)
    } else {
        format!("file:///{}", unix)
    }
}
