//! Version tags and resolution of the version to deploy.

use std::{cmp::Ordering, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use tokio::sync::OnceCell;

use crate::{error::ModuleError, git::VersionControl};

/// Prefix of every release tag of the upstream repository.
pub const VERSION_PREFIX: &str = "v";

fn components(version: &str) -> Result<Vec<u64>, ModuleError> {
    let stripped = version.strip_prefix(VERSION_PREFIX).unwrap_or(version);
    stripped
        .split('.')
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| ModuleError::InvalidVersionTag(version.to_string()))
        })
        .collect()
}

/// Compare two dotted versions component by component.
///
/// Components are compared numerically, a missing trailing component counts as
/// `0`, and a leading `v` is ignored: `1.0 == 1.0.0` and `1.2.10 > 1.2.3`.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, ModuleError> {
    let (a, b) = (components(a)?, components(b)?);
    let len = a.len().max(b.len());

    let ordering = (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal);

    Ok(ordering)
}

/// A release tag of the form `v<major>.<minor>.<patch...>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn parse(raw: &str) -> Result<Self, ModuleError> {
        let raw = raw.trim();
        if !raw.starts_with(VERSION_PREFIX) {
            return Err(ModuleError::InvalidVersionTag(raw.to_string()));
        }
        components(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialOrd for VersionTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionTag {
    fn cmp(&self, other: &Self) -> Ordering {
        // Both sides were validated by `parse`.
        compare_versions(&self.0, &other.0).unwrap_or(Ordering::Equal)
    }
}

/// Resolves the version of the explorer to deploy.
///
/// The first successful resolution is cached for the lifetime of the resolver and
/// never refreshed, so every operation of one controller sees the same version.
pub struct VersionResolver {
    vcs: Arc<dyn VersionControl>,
    repo_url: String,
    clone_dir: PathBuf,
    cache: OnceCell<VersionTag>,
}

impl VersionResolver {
    pub fn new(vcs: Arc<dyn VersionControl>, repo_url: impl Into<String>, clone_dir: PathBuf) -> Self {
        Self {
            vcs,
            repo_url: repo_url.into(),
            clone_dir,
            cache: OnceCell::new(),
        }
    }

    /// Pre-seed the cache so that [`Self::resolve`] never queries the repository.
    pub fn with_cached(self, tag: VersionTag) -> Self {
        Self {
            cache: OnceCell::new_with(Some(tag)),
            ..self
        }
    }

    /// The cached version, if one was resolved already.
    pub fn cached(&self) -> Option<&VersionTag> {
        self.cache.get()
    }

    /// Directory of the local clone of the upstream repository.
    pub fn clone_dir(&self) -> &PathBuf {
        &self.clone_dir
    }

    /// Whether a local clone of the upstream repository exists.
    pub fn has_local_clone(&self) -> bool {
        self.clone_dir.join(".git").exists()
    }

    pub async fn resolve(&self) -> Result<VersionTag> {
        self.cache
            .get_or_try_init(|| async {
                let tag = if self.has_local_clone() {
                    self.resolve_from_clone().await?
                } else {
                    self.resolve_from_remote().await?
                };
                tracing::info!(version = %tag, "Resolved explorer version");
                Ok::<_, anyhow::Error>(tag)
            })
            .await
            .cloned()
    }

    async fn resolve_from_remote(&self) -> Result<VersionTag> {
        tracing::debug!(repo = %self.repo_url, "Querying latest release tag");
        let raw = self
            .vcs
            .latest_release_version(&self.repo_url)
            .await
            .context("Failed to query the latest release")?;
        Ok(VersionTag::parse(&raw)?)
    }

    async fn resolve_from_clone(&self) -> Result<VersionTag> {
        let dir = &self.clone_dir;
        tracing::debug!(dir = %dir.display(), "Resolving version from local clone");

        if let Err(e) = self.vcs.fetch_tags(dir).await {
            tracing::warn!(error = %format!("{:#}", e), "Failed to fetch tags, using local tags");
        }

        let commit = self.vcs.latest_tagged_commit(dir).await?;
        if commit.is_empty() {
            return Err(ModuleError::NoVersionTag(format!(
                "no tagged commit in {}",
                dir.display()
            ))
            .into());
        }

        let tag = self.vcs.describe_tag(dir, &commit).await?;
        if tag.is_empty() {
            return Err(ModuleError::NoVersionTag(format!("no tag points at {}", commit)).into());
        }

        Ok(VersionTag::parse(&tag)?)
    }
}
