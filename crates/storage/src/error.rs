//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File or directory does not exist
    #[display("not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Operation is never allowed on this path (deleting the disk root)
    #[display("forbidden: {}", _0.display())]
    Forbidden(#[error(not(source))] PathBuf),
    /// Access denied by the host
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Glob pattern is malformed or tries to leave the root
    #[display("invalid pattern: {_0}")]
    InvalidPattern(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Map a host I/O error onto the logical path the caller asked for.
    pub(crate) fn from_io(err: IoError, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_mapped_to_logical_paths() {
        let err = IoError::new(std::io::ErrorKind::NotFound, "gone");
        let kind = ErrorKind::from_io(err, Path::new("/a/b.txt"));
        assert!(matches!(&kind, ErrorKind::NotFound(p) if p == Path::new("/a/b.txt")));

        let err = IoError::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(ErrorKind::from_io(err, Path::new("x")), ErrorKind::PermissionDenied(_)));

        let err = IoError::other("disk on fire");
        assert!(matches!(ErrorKind::from_io(err, Path::new("x")), ErrorKind::Io(_)));
    }

    #[test]
    fn error_kind_retryable() {
        assert!(!ErrorKind::NotFound(PathBuf::from("a")).is_retryable());
        assert!(!ErrorKind::Forbidden(PathBuf::from("/")).is_retryable());
        assert!(ErrorKind::Io(IoError::other("flaky")).is_retryable());
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Forbidden(PathBuf::from("/")).to_string(), "forbidden: /");
        assert_eq!(ErrorKind::InvalidPattern("[".to_string()).to_string(), "invalid pattern: [");
    }
}
