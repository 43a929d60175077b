//! Named disk registry.
//!
//! [`StorageManager`] turns a [`StorageConfig`] into live disks. Each disk
//! names a driver, and each driver name maps to a factory that builds the
//! disk from its [`DiskConfig`]. The `local` and `memory` drivers are always
//! registered; more can be added with [`StorageManager::add_driver`].
//!
//! # Examples
//!
//! ```
//! use stowage_config::{DiskConfig, StorageConfig};
//! use stowage_manager::StorageManager;
//!
//! let config = StorageConfig::new("scratch", [DiskConfig::memory("scratch")]);
//! let manager = StorageManager::new(config)?;
//! let disk = manager.disk(None)?;
//! assert_eq!(disk.name(), "scratch");
//! # Ok::<(), stowage_manager::error::Error>(())
//! ```

pub mod drivers;
pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::instrument;

pub use stowage_config::{DiskConfig, StorageConfig};
pub use stowage_storage::DiskHandle;

/// Builds a disk from its configuration.
pub type DriverFactory = Arc<dyn Fn(&DiskConfig) -> Result<DiskHandle> + Send + Sync>;

/// Registry of driver factories and the disks built from them.
///
/// Lookups take `&self`, so a built manager can be shared behind an [`Arc`].
/// Registration takes `&mut self`.
pub struct StorageManager {
    drivers: HashMap<String, DriverFactory>,
    disks: HashMap<String, DiskHandle>,
    default_disk: String,
}

impl StorageManager {
    /// Build every configured disk.
    ///
    /// Fails if the configuration is invalid, if a disk names a driver that
    /// is not registered, or if a driver cannot build its disk.
    #[instrument(skip_all, fields(default = %config.default, disks = config.disks.len()))]
    pub fn new(config: StorageConfig) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let mut manager = Self::with_builtin_drivers(config.default);
        for disk in config.disks {
            manager.add_disk(disk)?;
        }
        Ok(manager)
    }

    fn with_builtin_drivers(default_disk: String) -> Self {
        let mut manager = Self { drivers: HashMap::new(), disks: HashMap::new(), default_disk };
        manager.add_driver("local", drivers::local);
        manager.add_driver("memory", drivers::memory);
        manager
    }

    /// Register a factory under `name`, replacing any previous factory with
    /// that name. Disks that are already built keep their driver.
    pub fn add_driver<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&DiskConfig) -> Result<DiskHandle> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(driver = %name, "Registering driver");
        self.drivers.insert(name, Arc::new(factory));
        self
    }

    /// Build a disk with the factory its configuration names and register it.
    pub fn add_disk(&mut self, config: DiskConfig) -> Result<DiskHandle> {
        if self.disks.contains_key(&config.name) {
            exn::bail!(ErrorKind::DuplicateDisk(config.name));
        }
        let Some(factory) = self.drivers.get(&config.driver) else {
            exn::bail!(ErrorKind::UnconfiguredDriver(config.driver));
        };
        tracing::debug!(disk = %config.name, driver = %config.driver, "Building disk");
        let disk = factory(&config)?;
        self.add_disk_with_driver(config.name, disk)
    }

    /// Register an already built disk under `name`.
    pub fn add_disk_with_driver(&mut self, name: impl Into<String>, disk: DiskHandle) -> Result<DiskHandle> {
        match self.disks.entry(name.into()) {
            Entry::Occupied(entry) => exn::bail!(ErrorKind::DuplicateDisk(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(disk = %entry.key(), "Registered disk");
                Ok(entry.insert(disk).clone())
            },
        }
    }

    /// Look up a disk by name, or the default disk when no name (or an empty
    /// one) is given.
    pub fn disk(&self, name: Option<&str>) -> Result<DiskHandle> {
        let name = name.filter(|name| !name.is_empty()).unwrap_or(&self.default_disk);
        match self.disks.get(name) {
            Some(disk) => Ok(Arc::clone(disk)),
            None => exn::bail!(ErrorKind::UnknownDisk(name.to_string())),
        }
    }

    pub fn default_disk_name(&self) -> &str {
        &self.default_disk
    }

    /// Names of every registered disk, in no particular order.
    pub fn disk_names(&self) -> impl Iterator<Item = &str> {
        self.disks.keys().map(String::as_str)
    }

    pub fn has_driver(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .field("disks", &self.disks.keys().collect::<Vec<_>>())
            .field("default_disk", &self.default_disk)
            .finish()
    }
}
