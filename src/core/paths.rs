/*!
 * Path relationship helpers used by the copier and pruner
 */

use std::path::{Path, PathBuf};

/// Platform tag used for OS-specific error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    Windows,
    Linux,
    Mac,
    Unknown,
}

/// The platform this process is running on.
pub fn current_os() -> OsKind {
    match std::env::consts::OS {
        "windows" => OsKind::Windows,
        "linux" => OsKind::Linux,
        "macos" => OsKind::Mac,
        _ => OsKind::Unknown,
    }
}

/// Absolute form of `path` without resolving symlinks.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// True iff `child`'s absolute form begins with `parent`'s absolute form.
///
/// This is a byte-exact prefix comparison, no case normalization. Equal
/// paths count as child.
pub fn is_child(parent: &Path, child: &Path) -> bool {
    let parent = absolute(parent);
    let child = absolute(child);
    child
        .as_os_str()
        .as_encoded_bytes()
        .starts_with(parent.as_os_str().as_encoded_bytes())
}

/// Splits `child` below `parent`, returning the absolutized parent and the
/// relative suffix. The suffix is empty when `child` is not below `parent`
/// (and for equal paths).
pub fn split_below(parent: &Path, child: &Path) -> (PathBuf, PathBuf) {
    let parent = absolute(parent);
    let child = absolute(child);
    if !child
        .as_os_str()
        .as_encoded_bytes()
        .starts_with(parent.as_os_str().as_encoded_bytes())
    {
        return (parent, PathBuf::new());
    }
    let suffix = child
        .strip_prefix(&parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    (parent, suffix)
}
