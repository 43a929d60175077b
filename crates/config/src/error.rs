//! Configuration Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration file could not be read or parsed. Fix the file.
    #[display("failed to load configuration")]
    Load,
    /// File extension does not name a supported format.
    #[display("unsupported configuration format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The default disk is not among the configured disks.
    #[display("default disk is not configured: {_0}")]
    UnknownDefault(#[error(not(source))] String),
    /// Two disks share the same name.
    #[display("duplicate disk name: {_0}")]
    DuplicateDisk(#[error(not(source))] String),
    /// A disk was configured without a name.
    #[display("disk name cannot be empty")]
    EmptyName,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
