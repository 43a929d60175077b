//! Manager Error Types

use derive_more::{Display, Error};

/// A manager error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration itself is invalid.
    #[display("invalid storage configuration")]
    Config,
    /// A disk names a driver nobody registered a factory for.
    #[display("no driver registered under: {_0}")]
    UnconfiguredDriver(#[error(not(source))] String),
    /// No disk is registered under the requested name.
    #[display("unknown disk: {_0}")]
    UnknownDisk(#[error(not(source))] String),
    /// A disk is already registered under this name.
    #[display("disk already registered: {_0}")]
    DuplicateDisk(#[error(not(source))] String),
    /// Driver options could not be understood by the driver.
    #[display("invalid options for disk: {_0}")]
    InvalidOptions(#[error(not(source))] String),
    /// The driver failed to build the disk (see the underlying error).
    #[display("driver failed to build disk")]
    Driver,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed. Every manager error comes
    /// from configuration, so none of them are; a driver's own transient
    /// failure is judged on the storage error it wraps.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
