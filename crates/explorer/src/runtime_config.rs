//! Runtime configuration of the front-end, injected after container creation.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    compose::{ComposeStack, Orchestrator, Service},
    fs::FsHandler,
    network::NetworkDescriptor,
    settings::ModuleSettings,
};

/// Absolute path of the runtime configuration inside the front-end container.
pub const CONTAINER_CONFIG_PATH: &str = "/app/public/runtime-config.js";

/// Global the front-end reads its configuration from.
const CONFIG_GLOBAL: &str = "window.__RUNTIME_CONFIG__";

/// Network entry of the runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    pub name: String,
    pub icon_url: String,
    pub rpc_url: String,
    pub l2_chain_id: u64,
}

/// Configuration payload served to the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigPayload {
    pub api_url: String,
    pub explorer_url: String,
    pub network: NetworkEntry,
}

impl RuntimeConfigPayload {
    pub fn new(settings: &ModuleSettings, network: &NetworkDescriptor) -> Self {
        Self {
            api_url: settings.api_url(),
            explorer_url: settings.frontend_url(),
            network: NetworkEntry {
                name: settings.display_name.clone(),
                icon_url: settings.icon_url.clone(),
                rpc_url: network.rpc_url.clone(),
                l2_chain_id: network.chain_id,
            },
        }
    }

    /// Render as a self-executing script assigning the configuration global.
    pub fn render(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize runtime config")?;
        Ok(format!(
            "(function () {{\n  {} = {};\n}})();\n",
            CONFIG_GLOBAL, json
        ))
    }
}

/// Render the runtime configuration to `local_path` and copy it into the
/// front-end container of `stack`.
pub async fn inject(
    orchestrator: &dyn Orchestrator,
    stack: &ComposeStack,
    payload: &RuntimeConfigPayload,
    local_path: &Path,
) -> Result<()> {
    let script = payload.render()?;
    FsHandler::write_file(local_path, script)?;

    let container = stack.container_name(Service::Frontend);
    orchestrator
        .copy_into_container(&container, local_path, Path::new(CONTAINER_CONFIG_PATH))
        .await
        .context("Failed to inject runtime config into the front-end")?;

    tracing::debug!(container, path = CONTAINER_CONFIG_PATH, "Runtime config injected");
    Ok(())
}
