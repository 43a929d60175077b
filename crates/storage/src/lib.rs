//! Storage disks for stowage.
//!
//! Every disk implements [`Driver`]: one asynchronous contract for
//! directories, files and glob listings addressed by logical paths rooted at
//! `/`. The disk root is a hard boundary, nothing outside it can be reached.

pub mod driver;
pub mod error;
mod content;
mod models;
mod path;
mod pattern;

pub use crate::content::{ByteReader, Content};
#[cfg(feature = "memory")]
pub use crate::driver::MemoryDriver;
pub use crate::driver::{DEFAULT_DIRECTORY_PATTERN, DEFAULT_FILE_PATTERN, Driver, LocalDriver};
pub use crate::models::{EntryKind, Exists, FileInfo, ListKind, ListOptions, Removal};
pub use crate::path::normalize as normalize_path;
use std::sync::Arc;

pub type DiskHandle = Arc<dyn Driver>;
