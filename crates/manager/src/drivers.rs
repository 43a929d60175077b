//! Built-in driver factories.
//!
//! Each factory turns a [`DiskConfig`] into a ready disk. Driver options are
//! parsed into a typed struct that rejects unknown keys, so a typo in the
//! configuration fails when the disk is built rather than being ignored.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use stowage_config::DiskConfig;
use stowage_storage::{DiskHandle, LocalDriver, MemoryDriver};

/// Options understood by the `local` driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalOptions {
    /// Create the root directory when it is missing. When disabled the root
    /// is not touched until the first operation.
    #[serde(default = "enabled")]
    pub create_root: bool,
}
impl Default for LocalOptions {
    fn default() -> Self {
        Self { create_root: true }
    }
}

fn enabled() -> bool {
    true
}

/// The `memory` driver takes no options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryOptions {}

/// Deserialize the free-form options of a disk into a driver's typed options.
pub fn parse_options<T: DeserializeOwned>(config: &DiskConfig) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(config.options.clone()))
        .or_raise(|| ErrorKind::InvalidOptions(config.name.clone()))
}

/// Build a local disk. Relative roots are resolved against the current
/// working directory.
pub fn local(config: &DiskConfig) -> Result<DiskHandle> {
    let options: LocalOptions = parse_options(config)?;
    let root = config.root.as_deref().ok_or_raise(|| ErrorKind::InvalidOptions(config.name.clone()))?;
    let root = std::path::absolute(root).or_raise(|| ErrorKind::InvalidOptions(config.name.clone()))?;
    let driver = match options.create_root {
        true => LocalDriver::new(&config.name, &root),
        false => LocalDriver::detached(&config.name, &root),
    };
    Ok(Arc::new(driver.or_raise(|| ErrorKind::Driver)?))
}

/// Build an empty in-memory disk.
pub fn memory(config: &DiskConfig) -> Result<DiskHandle> {
    let MemoryOptions {} = parse_options(config)?;
    Ok(Arc::new(MemoryDriver::new(&config.name)))
}
