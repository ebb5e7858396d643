//! Static settings of the explorer module.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::network::NetworkDescriptor;

/// Default compose project name.
pub const DEFAULT_PROJECT_NAME: &str = "kup-explorer";
/// Default upstream repository of the explorer.
pub const DEFAULT_REPO_URL: &str = "https://github.com/kupcake/explorer.git";
/// Default host port of the front-end.
pub const DEFAULT_FRONTEND_PORT: u16 = 3000;
/// Default host port of the indexing API.
pub const DEFAULT_API_PORT: u16 = 4000;
/// Environment variable prefix of the settings.
pub const ENV_PREFIX: &str = "KUP_EXPLORER_";

/// Settings of the explorer module.
///
/// Loaded from an optional TOML file, overridden by `KUP_EXPLORER_*` environment
/// variables (nested keys separated by `__`, e.g. `KUP_EXPLORER_NETWORK__CHAIN_ID`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSettings {
    /// Writable data directory of the module.
    pub data_dir: PathBuf,
    /// Compose project name, also the prefix of container and volume names.
    pub project_name: String,
    /// Upstream repository the versions are resolved from.
    pub repo_url: String,
    /// Host port of the front-end.
    pub frontend_port: u16,
    /// Host port of the indexing API.
    pub api_port: u16,
    /// Network name shown by the front-end.
    pub display_name: String,
    /// Network icon shown by the front-end.
    pub icon_url: String,
    /// Interval between readiness polls, in seconds.
    pub poll_interval_secs: u64,
    /// Target network. When absent, the host resolves it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkDescriptor>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kupcake")
                .join("explorer"),
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            repo_url: DEFAULT_REPO_URL.to_string(),
            frontend_port: DEFAULT_FRONTEND_PORT,
            api_port: DEFAULT_API_PORT,
            display_name: "Kupcake L2".to_string(),
            icon_url: "/icons/network.svg".to_string(),
            poll_interval_secs: 2,
            network: None,
        }
    }
}

impl ModuleSettings {
    /// Load the settings from `path` (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("Settings file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        let settings: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to load explorer settings")?;

        tracing::debug!(?settings, "Settings loaded");
        Ok(settings)
    }

    /// Local clone of the upstream repository.
    pub fn clone_dir(&self) -> PathBuf {
        self.data_dir.join("source")
    }

    /// Local copy of the rendered runtime configuration.
    pub fn runtime_config_path(&self) -> PathBuf {
        self.data_dir.join("runtime-config.js")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Host URL of the front-end.
    pub fn frontend_url(&self) -> String {
        format!("http://localhost:{}", self.frontend_port)
    }

    /// Host URL of the indexing API.
    pub fn api_url(&self) -> String {
        format!("http://localhost:{}", self.api_port)
    }
}
