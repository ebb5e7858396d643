//! Lifecycle of one explorer installation.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    command::SystemCommandRunner,
    compose::{ComposeStack, DB_VOLUME, DockerCompose, Orchestrator, Service, ServiceStatus},
    error::ModuleError,
    fs::FsHandler,
    git::{GitCli, VersionControl},
    network::NetworkResolver,
    provision::StackProvisioner,
    readiness::{
        ChainRpc, HeightSource, IndexerApi, ReadinessEvent, ReadinessPolicy, wait_for_convergence,
    },
    runtime_config::{self, RuntimeConfigPayload},
    settings::ModuleSettings,
    store::{ConfigStore, FileConfigStore, ModuleConfig},
    version::{VersionResolver, VersionTag},
};

/// Containers holding indexed state, removed by [`ExplorerModule::reset_indexed_state`].
const STATEFUL_SERVICES: [Service; 3] = [Service::Worker, Service::Api, Service::Db];

/// Endpoints exposed by a running installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupInfo {
    pub frontend_url: String,
    pub api_url: String,
    pub rpc_url: Option<String>,
}

impl std::fmt::Display for StartupInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Explorer:  {}", self.frontend_url)?;
        write!(f, "API:       {}", self.api_url)?;
        if let Some(rpc) = &self.rpc_url {
            write!(f, "\nRPC:       {}", rpc)?;
        }
        Ok(())
    }
}

/// Controller of the explorer stack: install, start, stop, clean and update.
///
/// Operations are expected to be awaited one at a time on a given instance.
/// `start` does not wait for the indexer; call [`Self::wait_until_ready`] for that.
pub struct ExplorerModule {
    settings: ModuleSettings,
    orchestrator: Arc<dyn Orchestrator>,
    vcs: Arc<dyn VersionControl>,
    network: Arc<dyn NetworkResolver>,
    store: Arc<dyn ConfigStore>,
    versions: VersionResolver,
}

impl ExplorerModule {
    pub fn new(
        settings: ModuleSettings,
        orchestrator: Arc<dyn Orchestrator>,
        vcs: Arc<dyn VersionControl>,
        network: Arc<dyn NetworkResolver>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        let versions =
            VersionResolver::new(vcs.clone(), settings.repo_url.clone(), settings.clone_dir());
        Self {
            settings,
            orchestrator,
            vcs,
            network,
            store,
            versions,
        }
    }

    /// Module backed by the local Docker daemon, the `git` CLI and a config file in
    /// the data directory.
    pub fn local(settings: ModuleSettings, network: Arc<dyn NetworkResolver>) -> Self {
        let runner = Arc::new(SystemCommandRunner);
        let store = Arc::new(FileConfigStore::new(settings.data_dir.clone()));

        Self::new(
            settings,
            Arc::new(DockerCompose::new(runner.clone())),
            Arc::new(GitCli::new(runner)),
            network,
            store,
        )
    }

    /// Pin the version to deploy instead of resolving it.
    pub fn with_version(mut self, tag: VersionTag) -> Self {
        self.versions = self.versions.with_cached(tag);
        self
    }

    pub fn settings(&self) -> &ModuleSettings {
        &self.settings
    }

    fn stack(&self) -> ComposeStack {
        StackProvisioner::new(&self.settings).stack()
    }

    /// Provision the stack, create its containers and record the installation.
    ///
    /// With `from_source`, the upstream repository is cloned first (if not already)
    /// and the version is resolved from its tags. The module config is only written
    /// once everything else succeeded.
    pub async fn install(&self, from_source: bool) -> Result<VersionTag> {
        let network = self
            .network
            .node_info()
            .await
            .context("Failed to resolve the target network")?;

        if from_source && !self.versions.has_local_clone() {
            let dest = self.versions.clone_dir();
            // git only reports an unwritable destination through its stderr.
            FsHandler::create_data_directory(dest)
                .map_err(|e| ModuleError::classify_permission(e, &self.settings.data_dir))?;

            tracing::info!(repo = %self.settings.repo_url, dest = %dest.display(), "Cloning explorer sources");
            self.vcs.clone_repo(&self.settings.repo_url, dest).await?;
        }

        let version = self.versions.resolve().await?;

        let source_dir = if self.versions.has_local_clone() {
            let dir = self.versions.clone_dir();
            self.vcs.checkout(dir, version.as_str()).await?;
            Some(dir.as_path())
        } else {
            None
        };

        let stack = StackProvisioner::new(&self.settings)
            .provision(&version, &network, source_dir)
            .map_err(|e| ModuleError::classify_permission(e, &self.settings.data_dir))?;

        self.orchestrator
            .create(&stack)
            .await
            .context("Failed to create the explorer containers")?;

        let payload = RuntimeConfigPayload::new(&self.settings, &network);
        runtime_config::inject(
            self.orchestrator.as_ref(),
            &stack,
            &payload,
            &self.settings.runtime_config_path(),
        )
        .await?;

        self.store
            .save(&ModuleConfig::installed_with(version.as_str(), network.clone()))?;

        tracing::info!(%version, %network, "Explorer installed");
        Ok(version)
    }

    /// Whether the stack is installed for the network currently targeted.
    pub async fn is_installed(&self) -> Result<bool> {
        let config = self.store.load()?;
        let Some((version, stored)) = config.installation() else {
            return Ok(false);
        };

        let current = self.network.node_info().await?;
        if stored != &current {
            tracing::debug!(%stored, %current, "Installed for another network");
            return Ok(false);
        }

        let stack = self.stack();
        if !stack.is_provisioned() {
            return Ok(false);
        }

        let known = stack.container_names();
        let installed = self
            .orchestrator
            .status(&stack)
            .await?
            .iter()
            .any(|s| known.contains(&s.container));

        tracing::debug!(version, installed, "Checked installation");
        Ok(installed)
    }

    /// Start the stack. With `reset_state`, indexed state is discarded first.
    ///
    /// Fails with [`ModuleError::NotInstalled`] unless [`Self::is_installed`] holds:
    /// containers brought up by compose alone would miss the runtime config.
    pub async fn start(&self, reset_state: bool) -> Result<()> {
        if !self.is_installed().await? {
            return Err(ModuleError::NotInstalled.into());
        }
        let stack = self.stack();

        if reset_state {
            self.reset_indexed_state().await?;
        }

        self.orchestrator
            .up(&stack)
            .await
            .context("Failed to start the explorer")?;

        tracing::info!(project = %stack.project, "Explorer started");
        Ok(())
    }

    /// Force-remove the indexer, API and database containers and the database volume.
    ///
    /// Only the volume named after this stack's project is removed.
    pub async fn reset_indexed_state(&self) -> Result<()> {
        let stack = self.stack();

        for service in STATEFUL_SERVICES {
            let container = stack.container_name(service);
            self.orchestrator
                .remove_container(&container)
                .await
                .with_context(|| format!("Failed to remove container {}", container))?;
        }

        let volume = stack.volume_name(DB_VOLUME);
        if self.orchestrator.list_volumes().await?.contains(&volume) {
            self.orchestrator
                .remove_volume(&volume)
                .await
                .with_context(|| format!("Failed to remove volume {}", volume))?;
            tracing::info!(volume, "Indexed state removed");
        }

        Ok(())
    }

    /// Block until the indexer caught up with the installed network.
    pub async fn wait_until_ready(&self, policy: ReadinessPolicy) -> Result<u64> {
        let config = self.store.load()?;
        let (_, network) = config.installation().ok_or(ModuleError::NotInstalled)?;

        let indexer = IndexerApi::new(&self.settings.api_url())?;
        let chain = ChainRpc::new(network.rpc_url.clone())?;
        self.monitor(&indexer, &chain, policy).await
    }

    async fn monitor(
        &self,
        indexer: &dyn HeightSource,
        chain: &dyn HeightSource,
        policy: ReadinessPolicy,
    ) -> Result<u64> {
        let mut report = |event: ReadinessEvent| match event {
            ReadinessEvent::IndexerUnavailable { attempt } => {
                tracing::debug!(attempt, "Waiting for the indexer API")
            }
            ReadinessEvent::Syncing { indexed, target } => {
                tracing::info!(indexed, target, "Indexer syncing")
            }
            ReadinessEvent::Converged { height } => {
                tracing::info!(height, "Indexer caught up with the network")
            }
        };

        wait_for_convergence(indexer, chain, policy, &mut report).await
    }

    pub async fn stop(&self) -> Result<()> {
        let stack = self.stack();
        if !stack.is_provisioned() {
            tracing::debug!("Nothing to stop");
            return Ok(());
        }

        self.orchestrator
            .stop(&stack)
            .await
            .context("Failed to stop the explorer")?;
        tracing::info!("Explorer stopped");
        Ok(())
    }

    /// Remove containers, networks and volumes of the stack.
    pub async fn clean(&self) -> Result<()> {
        let stack = self.stack();
        if !stack.is_provisioned() {
            tracing::debug!("Nothing to clean");
            return Ok(());
        }

        self.orchestrator
            .down(&stack)
            .await
            .context("Failed to remove the explorer")?;
        tracing::info!("Explorer removed");
        Ok(())
    }

    /// Tear the stack down and install it again.
    pub async fn update(&self) -> Result<VersionTag> {
        self.clean().await?;
        self.install(self.versions.has_local_clone()).await
    }

    pub async fn is_running(&self) -> Result<bool> {
        Ok(self.status().await?.iter().any(ServiceStatus::is_running))
    }

    /// Containers of the stack. Empty when not provisioned.
    pub async fn status(&self) -> Result<Vec<ServiceStatus>> {
        let stack = self.stack();
        if !stack.is_provisioned() {
            return Ok(Vec::new());
        }
        self.orchestrator.status(&stack).await
    }

    pub async fn logs(&self) -> Result<String> {
        let stack = self.stack();
        if !stack.is_provisioned() {
            return Err(ModuleError::NotInstalled.into());
        }
        self.orchestrator.logs(&stack).await
    }

    pub fn startup_info(&self) -> Result<StartupInfo> {
        let rpc_url = self.store.load()?.network.map(|network| network.rpc_url);
        Ok(StartupInfo {
            frontend_url: self.settings.frontend_url(),
            api_url: self.settings.api_url(),
            rpc_url,
        })
    }

    /// Last successfully installed version.
    pub fn version(&self) -> Result<Option<String>> {
        Ok(self.store.load()?.version)
    }
}
