//! Declarative disk configuration.
//!
//! A [`StorageConfig`] names the default disk and lists every disk with its
//! driver, root and driver-specific options. It is read once at startup and
//! handed to the storage manager.
//!
//! ```yaml
//! default: local
//! disks:
//!   - name: local
//!     root: /srv/files
//!   - name: scratch
//!     driver: memory
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Prefix of environment variables merged over the configuration file.
pub const ENV_PREFIX: &str = "STOWAGE_";
/// Driver used when a disk does not name one.
pub const DEFAULT_DRIVER: &str = "local";

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

/// Configuration of one named disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskConfig {
    pub name: String,
    /// Name of a driver registered with the manager
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Host directory the disk is confined to (local driver)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Driver-specific options, validated by the driver that receives them
    #[serde(default, alias = "config", skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}
impl DiskConfig {
    pub fn local(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            driver: DEFAULT_DRIVER.to_string(),
            root: Some(root.into()),
            options: serde_json::Map::new(),
        }
    }

    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: "memory".to_string(),
            root: None,
            options: serde_json::Map::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Every configured disk plus the name of the default one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Disk used when a caller does not name one
    pub default: String,
    #[serde(default)]
    pub disks: Vec<DiskConfig>,
}

impl StorageConfig {
    pub fn new(default: impl Into<String>, disks: impl IntoIterator<Item = DiskConfig>) -> Self {
        Self { default: default.into(), disks: disks.into_iter().collect() }
    }

    /// Load a configuration file, picking the format from its extension, then
    /// merge `STOWAGE_`-prefixed environment variables over it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // Figment silently skips missing files; a missing file is an error here.
        std::fs::metadata(path).or_raise(|| ErrorKind::Load)?;
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
        let figment = match extension {
            "yaml" | "yml" => Figment::from(Yaml::file(path)),
            "toml" => Figment::from(Toml::file(path)),
            "json" => Figment::from(Json::file(path)),
            other => exn::bail!(ErrorKind::UnsupportedFormat(other.to_string())),
        };
        tracing::debug!(path = %path.display(), "Loading storage configuration");
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Extract and validate a configuration from an existing figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Conventional location of the configuration file for this platform,
    /// e.g. `~/.config/stowage/storage.yaml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "stowage").map(|dirs| dirs.config_dir().join("storage.yaml"))
    }

    /// Disk names must be non-empty and unique, and the default disk must be
    /// one of them.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.disks.len());
        for disk in &self.disks {
            if disk.name.trim().is_empty() {
                exn::bail!(ErrorKind::EmptyName);
            }
            if !seen.insert(disk.name.as_str()) {
                exn::bail!(ErrorKind::DuplicateDisk(disk.name.clone()));
            }
        }
        if !seen.contains(self.default.as_str()) {
            exn::bail!(ErrorKind::UnknownDefault(self.default.clone()));
        }
        Ok(())
    }

    pub fn disk(&self, name: &str) -> Option<&DiskConfig> {
        self.disks.iter().find(|disk| disk.name == name)
    }
}
