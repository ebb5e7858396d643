//! Version control client for the upstream explorer repository.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::{
    command::{CommandRunner, CommandSpec},
    error::ModuleError,
    version::{VERSION_PREFIX, compare_versions},
};

/// Operations on the upstream repository, remote and local.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Clone `url` into `dest`.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    /// The highest released version tag published on the remote `repo`.
    async fn latest_release_version(&self, repo: &str) -> Result<String>;

    /// `git fetch --tags` in a local clone.
    async fn fetch_tags(&self, repo_dir: &Path) -> Result<()>;

    /// Hash of the most recent tagged commit (`git rev-list --tags --max-count=1`).
    async fn latest_tagged_commit(&self, repo_dir: &Path) -> Result<String>;

    /// Tag name pointing at `commit` (`git describe --tags <commit>`).
    async fn describe_tag(&self, repo_dir: &Path, commit: &str) -> Result<String>;

    /// `git checkout <reference>` in a local clone.
    async fn checkout(&self, repo_dir: &Path, reference: &str) -> Result<()>;
}

/// [`VersionControl`] implemented on top of the `git` command line.
#[derive(Clone)]
pub struct GitCli {
    runner: Arc<dyn CommandRunner>,
}

impl GitCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn git(&self, repo_dir: Option<&Path>, args: &[&str]) -> Result<String> {
        let mut spec = CommandSpec::new("git").args(args.iter().copied());
        if let Some(dir) = repo_dir {
            spec = spec.current_dir(dir);
        }
        let output = self.runner.run(&spec).await?;
        Ok(output.stdout.trim().to_string())
    }
}

/// Extract the release tags from `git ls-remote --tags --refs` output.
fn parse_remote_tags(listing: &str) -> Vec<&str> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|reference| reference.strip_prefix("refs/tags/"))
        .filter(|tag| tag.starts_with(VERSION_PREFIX))
        .filter(|tag| compare_versions(tag, tag).is_ok())
        .collect()
}

/// Pick the highest version of `tags`.
fn highest_version<'a>(tags: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    tags.into_iter().fold(None, |best, tag| match best {
        Some(current) if compare_versions(tag, current).is_ok_and(|o| o.is_le()) => Some(current),
        _ => Some(tag),
    })
}

#[async_trait]
impl VersionControl for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let dest_str = dest.display().to_string();
        tracing::info!(url, dest = %dest_str, "Cloning repository");
        self.git(None, &["clone", url, &dest_str])
            .await
            .with_context(|| format!("Failed to clone {}", url))?;
        Ok(())
    }

    async fn latest_release_version(&self, repo: &str) -> Result<String> {
        let listing = self
            .git(None, &["ls-remote", "--tags", "--refs", repo])
            .await
            .with_context(|| format!("Failed to list remote tags of {}", repo))?;

        let tag = highest_version(parse_remote_tags(&listing))
            .ok_or_else(|| ModuleError::NoVersionTag(format!("no release tag on {}", repo)))?;

        Ok(tag.to_string())
    }

    async fn fetch_tags(&self, repo_dir: &Path) -> Result<()> {
        self.git(Some(repo_dir), &["fetch", "--tags"]).await?;
        Ok(())
    }

    async fn latest_tagged_commit(&self, repo_dir: &Path) -> Result<String> {
        self.git(Some(repo_dir), &["rev-list", "--tags", "--max-count=1"])
            .await
            .context("Failed to find the latest tagged commit")
    }

    async fn describe_tag(&self, repo_dir: &Path, commit: &str) -> Result<String> {
        self.git(Some(repo_dir), &["describe", "--tags", commit])
            .await
            .with_context(|| format!("Failed to describe commit {}", commit))
    }

    async fn checkout(&self, repo_dir: &Path, reference: &str) -> Result<()> {
        self.git(Some(repo_dir), &["checkout", reference])
            .await
            .with_context(|| format!("Failed to checkout {}", reference))?;
        Ok(())
    }
}
