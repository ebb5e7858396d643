//! Docker engine client for container and volume level operations.

use std::path::Path;

use anyhow::{Context, Result};
use bollard::{
    Docker,
    container::{RemoveContainerOptions, UploadToContainerOptions},
    errors::Error as BollardError,
    volume::RemoveVolumeOptions,
};
use derive_more::Deref;

/// Whether a Docker API error means the object does not exist.
fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Pack a single file into an in-memory tar archive under `file_name`.
fn tar_single_file(file_name: &str, contents: &[u8]) -> Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, file_name, contents)
        .context("Failed to append file to tar archive")?;
    builder.into_inner().context("Failed to finish tar archive")
}

/// Docker client wrapper used next to the compose CLI.
#[derive(Deref, Clone)]
pub struct ExplorerDocker {
    #[deref]
    docker: Docker,
}

impl ExplorerDocker {
    /// Create a new Docker client.
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker. Is Docker running?")?;
        Ok(Self { docker })
    }

    /// Copy a local file into a container at the absolute path `dest`.
    pub async fn copy_file_into_container(
        &self,
        container_name: &str,
        local: &Path,
        dest: &Path,
    ) -> Result<()> {
        let contents = tokio::fs::read(local)
            .await
            .with_context(|| format!("Failed to read {}", local.display()))?;

        let (dir, file_name) = match (dest.parent(), dest.file_name()) {
            (Some(dir), Some(name)) => (dir, name.to_string_lossy().into_owned()),
            _ => anyhow::bail!("Invalid container destination: {}", dest.display()),
        };

        let archive = tar_single_file(&file_name, &contents)?;

        tracing::trace!(container_name, dest = %dest.display(), "Uploading file to container");

        self.docker
            .upload_to_container(
                container_name,
                Some(UploadToContainerOptions {
                    path: dir.display().to_string(),
                    ..Default::default()
                }),
                archive.into(),
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to copy {} into container {}",
                    local.display(),
                    container_name
                )
            })
    }

    /// Force-remove a container. A container that does not exist is not an error.
    pub async fn force_remove_container(&self, container_name: &str) -> Result<()> {
        tracing::trace!(container_name, "Force removing container");

        match self
            .docker
            .remove_container(
                container_name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => {
                tracing::debug!(container_name, "Container already removed");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to remove container {}", container_name)),
        }
    }

    /// Names of all volumes known to the engine.
    pub async fn volume_names(&self) -> Result<Vec<String>> {
        let response = self
            .docker
            .list_volumes::<String>(None)
            .await
            .context("Failed to list Docker volumes")?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.name)
            .collect())
    }

    /// Remove a volume by exact name. A volume that does not exist is not an error.
    pub async fn remove_volume(&self, name: &str) -> Result<()> {
        match self
            .docker
            .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove volume {}", name)),
        }
    }
}
