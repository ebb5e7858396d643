//! Persisted per-module state.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::network::NetworkDescriptor;

/// The file name of the persisted module state inside the data directory.
pub const MODULE_CONFIG_FILENAME: &str = "module.toml";
const MODULE_LOCK_FILENAME: &str = "module.lock";

/// State recorded after a successful install.
///
/// `version` and `network` are written together. A record where only one of them
/// is present is treated as not installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkDescriptor>,
}

impl ModuleConfig {
    /// Build a fully populated record.
    pub fn installed_with(version: impl Into<String>, network: NetworkDescriptor) -> Self {
        Self {
            version: Some(version.into()),
            network: Some(network),
        }
    }

    /// The installed version and network, if both are present.
    pub fn installation(&self) -> Option<(&str, &NetworkDescriptor)> {
        match (&self.version, &self.network) {
            (Some(version), Some(network)) => Some((version.as_str(), network)),
            _ => None,
        }
    }
}

/// Get/set access to the persisted [`ModuleConfig`].
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<ModuleConfig>;
    fn save(&self, config: &ModuleConfig) -> Result<()>;
}

/// [`ConfigStore`] writing TOML into the module data directory.
///
/// Saves are atomic: the record is written to a temporary file which is then
/// renamed over the previous one, under an exclusive advisory lock.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(MODULE_CONFIG_FILENAME)
    }

    fn with_lock<T>(&self, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create data directory {}", self.dir.display()))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(MODULE_LOCK_FILENAME))
            .context("Failed to open module lock file")?;
        lock.lock_exclusive()
            .context("Failed to acquire module lock")?;

        // The lock is released when `lock` is dropped.
        f(&self.path())
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<ModuleConfig> {
        let path = self.path();
        if !path.exists() {
            return Ok(ModuleConfig::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read module config from {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse module config as TOML")
    }

    fn save(&self, config: &ModuleConfig) -> Result<()> {
        let content =
            toml::to_string_pretty(config).context("Failed to serialize module config to TOML")?;

        self.with_lock(|path| {
            let tmp = path.with_extension("toml.tmp");
            std::fs::write(&tmp, content)
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            std::fs::rename(&tmp, path)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
            tracing::debug!(path = %path.display(), "Module config saved");
            Ok(())
        })
    }
}

/// In-memory [`ConfigStore`], for hosts that keep module state elsewhere and for tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    inner: Mutex<ModuleConfig>,
}

impl MemoryConfigStore {
    pub fn new(config: ModuleConfig) -> Self {
        Self {
            inner: Mutex::new(config),
        }
    }

    /// Replace the stored record, bypassing the module.
    pub fn set(&self, config: ModuleConfig) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = config;
    }

    pub fn get(&self) -> ModuleConfig {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<ModuleConfig> {
        Ok(self.get())
    }

    fn save(&self, config: &ModuleConfig) -> Result<()> {
        self.set(config.clone());
        Ok(())
    }
}
