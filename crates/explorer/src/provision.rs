//! Materialization of the compose stack on disk.

use std::path::Path;

use anyhow::{Context, Result};
use url::Url;

use crate::{
    compose::ComposeStack, fs::FsHandler, network::NetworkDescriptor, settings::ModuleSettings,
    version::VersionTag,
};

/// RPC port used when the RPC URL carries no explicit port.
pub const DEFAULT_RPC_PORT: u16 = 8545;

/// Compose manifest shipped with the crate, used when the upstream clone has none.
pub const EMBEDDED_MANIFEST: &str = include_str!("../assets/docker-compose.yml");

/// Port the containers use to reach the node on the host.
pub fn rpc_port(rpc_url: &str) -> u16 {
    match Url::parse(rpc_url) {
        Ok(url) => url.port().unwrap_or(DEFAULT_RPC_PORT),
        Err(e) => {
            tracing::warn!(rpc_url, error = %e, "Unparsable RPC URL, using default RPC port");
            DEFAULT_RPC_PORT
        }
    }
}

/// Writes the env file and the manifest of the stack.
#[derive(Debug, Clone)]
pub struct StackProvisioner<'a> {
    settings: &'a ModuleSettings,
}

impl<'a> StackProvisioner<'a> {
    pub fn new(settings: &'a ModuleSettings) -> Self {
        Self { settings }
    }

    /// Stack handle for the configured data directory.
    pub fn stack(&self) -> ComposeStack {
        ComposeStack::new(&self.settings.project_name, &self.settings.data_dir)
    }

    /// Render the env file consumed by the manifest.
    pub fn render_env(&self, version: &VersionTag, network: &NetworkDescriptor) -> String {
        [
            ("COMPOSE_PROJECT_NAME", self.settings.project_name.clone()),
            ("VERSION", version.to_string()),
            ("RPC_PORT", rpc_port(&network.rpc_url).to_string()),
            ("FRONTEND_PORT", self.settings.frontend_port.to_string()),
            ("API_PORT", self.settings.api_port.to_string()),
        ]
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
    }

    /// Write the env file and the manifest, returning the stack handle.
    ///
    /// The manifest is copied from `source_dir` when it provides one, otherwise the
    /// embedded manifest is used.
    pub fn provision(
        &self,
        version: &VersionTag,
        network: &NetworkDescriptor,
        source_dir: Option<&Path>,
    ) -> Result<ComposeStack> {
        let stack = self.stack();
        FsHandler::create_data_directory(&stack.dir)?;

        FsHandler::write_file(&stack.env_file(), self.render_env(version, network))?;

        let upstream = source_dir
            .map(|dir| dir.join(ComposeStack::MANIFEST_FILENAME))
            .filter(|path| path.exists());

        match upstream {
            Some(path) => {
                tracing::debug!(manifest = %path.display(), "Using manifest from local clone");
                std::fs::copy(&path, stack.manifest()).with_context(|| {
                    format!(
                        "Failed to copy {} to {}",
                        path.display(),
                        stack.manifest().display()
                    )
                })?;
            }
            None => FsHandler::write_file(&stack.manifest(), EMBEDDED_MANIFEST)?,
        }

        tracing::info!(dir = %stack.dir.display(), %version, "Stack provisioned");
        Ok(stack)
    }
}
