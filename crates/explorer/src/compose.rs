//! Container orchestration of the explorer stack through `docker compose`.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use strum::IntoEnumIterator;
use tokio::sync::OnceCell;

use crate::{
    command::{CommandRunner, CommandSpec},
    docker::ExplorerDocker,
};

/// Name of the database volume declared in the compose manifest.
pub const DB_VOLUME: &str = "db-data";

/// A service of the explorer stack.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Service {
    Frontend,
    Api,
    Worker,
    Db,
}

/// Handle on a provisioned compose stack. Recomputed on every call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeStack {
    /// Compose project name.
    pub project: String,
    /// Directory holding the manifest and the env file.
    pub dir: PathBuf,
}

impl ComposeStack {
    pub const MANIFEST_FILENAME: &'static str = "docker-compose.yml";
    pub const ENV_FILENAME: &'static str = ".env";

    pub fn new(project: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            dir: dir.into(),
        }
    }

    pub fn manifest(&self) -> PathBuf {
        self.dir.join(Self::MANIFEST_FILENAME)
    }

    pub fn env_file(&self) -> PathBuf {
        self.dir.join(Self::ENV_FILENAME)
    }

    /// Whether the manifest has been provisioned.
    pub fn is_provisioned(&self) -> bool {
        self.manifest().exists()
    }

    /// Container name compose assigns to the first replica of `service`.
    pub fn container_name(&self, service: Service) -> String {
        format!("{}-{}-1", self.project, service)
    }

    /// All container names this stack may own.
    pub fn container_names(&self) -> Vec<String> {
        Service::iter().map(|s| self.container_name(s)).collect()
    }

    /// Engine-level name of a volume declared in the manifest.
    pub fn volume_name(&self, volume: &str) -> String {
        format!("{}_{}", self.project, volume)
    }
}

/// State of a container as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    #[strum(default)]
    Other(String),
}

/// One container of the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub service: String,
    pub container: String,
    pub state: ContainerState,
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ComposePsEntry {
    name: String,
    service: String,
    state: String,
}

/// Parse `docker compose ps --format json`. Older compose releases print a JSON
/// array, newer ones one object per line.
pub fn parse_ps_output(output: &str) -> Result<Vec<ServiceStatus>> {
    let trimmed = output.trim();
    let entries: Vec<ComposePsEntry> = if trimmed.is_empty() {
        Vec::new()
    } else if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("Failed to parse compose ps output")?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Failed to parse compose ps line"))
            .collect::<Result<_>>()?
    };

    Ok(entries
        .into_iter()
        .map(|e| ServiceStatus {
            service: e.service,
            container: e.name,
            state: ContainerState::from_str(&e.state.to_lowercase())
                .unwrap_or(ContainerState::Other(e.state)),
        })
        .collect())
}

/// Container orchestrator driving the explorer stack.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Containers of the stack, running or not.
    async fn status(&self, stack: &ComposeStack) -> Result<Vec<ServiceStatus>>;
    /// Create the containers without starting them.
    async fn create(&self, stack: &ComposeStack) -> Result<()>;
    /// Create (if needed) and start the containers.
    async fn up(&self, stack: &ComposeStack) -> Result<()>;
    async fn stop(&self, stack: &ComposeStack) -> Result<()>;
    /// Remove containers, networks and volumes of the stack.
    async fn down(&self, stack: &ComposeStack) -> Result<()>;
    async fn logs(&self, stack: &ComposeStack) -> Result<String>;

    /// Copy a local file into a container at an absolute path.
    async fn copy_into_container(&self, container: &str, local: &Path, dest: &Path) -> Result<()>;
    /// Force-remove a container; a missing container is not an error.
    async fn remove_container(&self, container: &str) -> Result<()>;
    async fn list_volumes(&self) -> Result<Vec<String>>;
    /// Remove a volume by exact name; a missing volume is not an error.
    async fn remove_volume(&self, name: &str) -> Result<()>;
}

/// [`Orchestrator`] using the `docker compose` CLI for stack operations and the
/// Docker API for container and volume operations.
///
/// The Docker API client is only created by the first container or volume
/// operation.
pub struct DockerCompose {
    runner: Arc<dyn CommandRunner>,
    docker: OnceCell<ExplorerDocker>,
}

impl DockerCompose {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            docker: OnceCell::new(),
        }
    }

    /// Use an already connected Docker client.
    pub fn with_docker(runner: Arc<dyn CommandRunner>, docker: ExplorerDocker) -> Self {
        Self {
            runner,
            docker: OnceCell::new_with(Some(docker)),
        }
    }

    async fn docker(&self) -> Result<&ExplorerDocker> {
        self.docker
            .get_or_try_init(|| async { ExplorerDocker::new() })
            .await
    }

    fn compose_command(stack: &ComposeStack) -> CommandSpec {
        CommandSpec::new("docker")
            .arg("compose")
            .args(["--project-name", stack.project.as_str()])
            .args(["--project-directory".to_string(), stack.dir.display().to_string()])
            .args(["--file".to_string(), stack.manifest().display().to_string()])
            .args(["--env-file".to_string(), stack.env_file().display().to_string()])
    }

    async fn compose(&self, stack: &ComposeStack, args: &[&str]) -> Result<String> {
        let spec = Self::compose_command(stack).args(args.iter().copied());
        let output = self.runner.run(&spec).await?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl Orchestrator for DockerCompose {
    async fn status(&self, stack: &ComposeStack) -> Result<Vec<ServiceStatus>> {
        let output = self.compose(stack, &["ps", "--all", "--format", "json"]).await?;
        parse_ps_output(&output)
    }

    async fn create(&self, stack: &ComposeStack) -> Result<()> {
        self.compose(stack, &["create"]).await?;
        Ok(())
    }

    async fn up(&self, stack: &ComposeStack) -> Result<()> {
        self.compose(stack, &["up", "--detach"]).await?;
        Ok(())
    }

    async fn stop(&self, stack: &ComposeStack) -> Result<()> {
        self.compose(stack, &["stop"]).await?;
        Ok(())
    }

    async fn down(&self, stack: &ComposeStack) -> Result<()> {
        self.compose(stack, &["down", "--volumes", "--remove-orphans"])
            .await?;
        Ok(())
    }

    async fn logs(&self, stack: &ComposeStack) -> Result<String> {
        self.compose(stack, &["logs", "--no-color"]).await
    }

    async fn copy_into_container(&self, container: &str, local: &Path, dest: &Path) -> Result<()> {
        self.docker()
            .await?
            .copy_file_into_container(container, local, dest)
            .await
    }

    async fn remove_container(&self, container: &str) -> Result<()> {
        self.docker().await?.force_remove_container(container).await
    }

    async fn list_volumes(&self) -> Result<Vec<String>> {
        self.docker().await?.volume_names().await
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.docker().await?.remove_volume(name).await
    }
}
