//! Path confinement utilities.
//!
//! Every path handed to a [`Driver`](crate::Driver) is logical: rooted at `/`
//! and relative to the disk's configured root. These functions turn logical
//! paths into normalized relative paths that can never escape that root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Normalizes a logical path relative to the disk root.
///
/// A leading `/` is optional, `.` segments and duplicate separators are
/// dropped, and `..` is resolved lexically. An empty result means the disk
/// root itself.
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized relative path, or
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath) if the path would
/// leave the root.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use stowage_storage::normalize_path;
/// // Valid paths
/// assert_eq!(normalize_path("/1/2/3").unwrap(), Path::new("1/2/3"));
/// assert_eq!(normalize_path("a/../file.txt").unwrap(), Path::new("file.txt"));
/// assert_eq!(normalize_path("/").unwrap(), Path::new(""));
/// // Invalid paths
/// assert!(normalize_path("/../../etc/passwd").is_err());
/// assert!(normalize_path("a/../../b").is_err());
/// assert!(normalize_path("a\0b").is_err());
/// ```
pub fn normalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls, so reject them.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    Ok(components.into_iter().collect())
}

/// Turns a normalized relative path back into its logical form (`/a/b`).
pub(crate) fn logical(relative: &Path) -> PathBuf {
    Path::new("/").join(relative)
}

/// Whether a normalized relative path designates the disk root.
pub(crate) fn is_root(relative: &Path) -> bool {
    relative.as_os_str().is_empty()
}
