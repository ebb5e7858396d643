//! In-memory fakes of the external collaborators, for unit tests.
//!
//! Every fake records the calls it receives so tests can assert on the exact
//! interaction with the outside world.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use anyhow::Result;
use async_trait::async_trait;
use strum::IntoEnumIterator;

use crate::{
    command::{CommandOutput, CommandRunner, CommandSpec},
    compose::{ComposeStack, ContainerState, DB_VOLUME, Orchestrator, Service, ServiceStatus},
    error::ModuleError,
    git::VersionControl,
    network::{NetworkDescriptor, NetworkResolver},
    readiness::HeightSource,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap()
}

/// [`CommandRunner`] answering from a script keyed by a substring of the arguments.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<(String, Result<String, String>)>>,
    calls: Mutex<Vec<(String, Option<PathBuf>)>>,
}

impl ScriptedRunner {
    /// Answer commands whose arguments contain `needle` with `stdout` or a failure with `stderr`.
    pub fn respond(&self, needle: &str, result: Result<&str, &str>) {
        lock(&self.responses).push((
            needle.to_string(),
            result.map(str::to_string).map_err(str::to_string),
        ));
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn last_cwd(&self) -> Option<PathBuf> {
        lock(&self.calls).last().and_then(|(_, cwd)| cwd.clone())
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ModuleError> {
        lock(&self.calls).push((spec.to_string(), spec.cwd.clone()));

        let joined = spec.args.join(" ");
        let response = lock(&self.responses)
            .iter()
            .find(|(needle, _)| joined.contains(needle.as_str()))
            .map(|(_, result)| result.clone());

        match response {
            None => Ok(CommandOutput::default()),
            Some(Ok(stdout)) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            Some(Err(stderr)) => Err(ModuleError::CommandFailed {
                program: spec.program.clone(),
                args: spec.args.clone(),
                code: Some(1),
                stderr,
            }),
        }
    }
}

/// [`VersionControl`] with a configurable remote tag and local clone.
#[derive(Default)]
pub struct FakeVcs {
    remote: Mutex<String>,
    local_commit: String,
    local_tag: String,
    fetch_fails: AtomicBool,
    remote_queries: AtomicU32,
    checkouts: Mutex<Vec<String>>,
    clones: Mutex<Vec<PathBuf>>,
}

impl FakeVcs {
    pub fn with_remote(tag: &str) -> Self {
        Self {
            remote: Mutex::new(tag.to_string()),
            ..Default::default()
        }
    }

    pub fn with_local(commit: &str, tag: &str) -> Self {
        Self {
            local_commit: commit.to_string(),
            local_tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn set_remote(&self, tag: &str) {
        *lock(&self.remote) = tag.to_string();
    }

    pub fn fail_fetch(&self) {
        self.fetch_fails.store(true, Ordering::Relaxed);
    }

    pub fn remote_queries(&self) -> u32 {
        self.remote_queries.load(Ordering::Relaxed)
    }

    pub fn checkouts(&self) -> Vec<String> {
        lock(&self.checkouts).clone()
    }

    pub fn clones(&self) -> Vec<PathBuf> {
        lock(&self.clones).clone()
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn clone_repo(&self, _url: &str, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest.join(".git"))?;
        lock(&self.clones).push(dest.to_path_buf());
        Ok(())
    }

    async fn latest_release_version(&self, _repo: &str) -> Result<String> {
        self.remote_queries.fetch_add(1, Ordering::Relaxed);
        Ok(lock(&self.remote).clone())
    }

    async fn fetch_tags(&self, _repo_dir: &Path) -> Result<()> {
        if self.fetch_fails.load(Ordering::Relaxed) {
            return Err(ModuleError::CommandFailed {
                program: "git".to_string(),
                args: vec!["fetch".to_string(), "--tags".to_string()],
                code: Some(128),
                stderr: "Could not resolve host".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn latest_tagged_commit(&self, _repo_dir: &Path) -> Result<String> {
        Ok(self.local_commit.clone())
    }

    async fn describe_tag(&self, _repo_dir: &Path, _commit: &str) -> Result<String> {
        Ok(self.local_tag.clone())
    }

    async fn checkout(&self, _repo_dir: &Path, reference: &str) -> Result<()> {
        lock(&self.checkouts).push(reference.to_string());
        Ok(())
    }
}

/// [`HeightSource`] replaying a script of answers, repeating the last one.
#[derive(Default)]
pub struct FakeHeights {
    script: Mutex<VecDeque<Result<u64, String>>>,
    error: Mutex<Option<ModuleError>>,
    calls: AtomicU32,
}

impl FakeHeights {
    pub fn sequence(script: impl IntoIterator<Item = Result<u64, &'static str>>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|r| r.map_err(str::to_string))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn constant(height: u64) -> Self {
        Self::sequence([Ok(height)])
    }

    /// Fail the first call with `err`.
    pub fn failing_with(err: ModuleError) -> Self {
        Self {
            error: Mutex::new(Some(err)),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HeightSource for FakeHeights {
    async fn latest_height(&self) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(err) = lock(&self.error).take() {
            return Err(err.into());
        }

        let mut script = lock(&self.script);
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };

        match next {
            Some(Ok(height)) => Ok(height),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
            None => anyhow::bail!("no height scripted"),
        }
    }
}

/// [`NetworkResolver`] whose answer can be changed by the test.
pub struct FakeNetwork {
    current: Mutex<NetworkDescriptor>,
}

impl FakeNetwork {
    pub fn new(network: NetworkDescriptor) -> Self {
        Self {
            current: Mutex::new(network),
        }
    }

    pub fn set(&self, network: NetworkDescriptor) {
        *lock(&self.current) = network;
    }
}

#[async_trait]
impl NetworkResolver for FakeNetwork {
    async fn node_info(&self) -> Result<NetworkDescriptor> {
        Ok(lock(&self.current).clone())
    }
}

/// [`Orchestrator`] simulating containers and volumes in memory.
#[derive(Default)]
pub struct FakeOrchestrator {
    containers: Mutex<Vec<ServiceStatus>>,
    volumes: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    copied: Mutex<Vec<(String, PathBuf, String)>>,
    fail_copy: AtomicBool,
}

impl FakeOrchestrator {
    pub fn with_volumes(volumes: &[&str]) -> Self {
        Self {
            volumes: Mutex::new(volumes.iter().map(|v| v.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn fail_copy(&self) {
        self.fail_copy.store(true, Ordering::Relaxed);
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn volumes(&self) -> Vec<String> {
        lock(&self.volumes).clone()
    }

    pub fn containers(&self) -> Vec<ServiceStatus> {
        lock(&self.containers).clone()
    }

    /// Files copied into containers: `(container, destination, contents)`.
    pub fn copied(&self) -> Vec<(String, PathBuf, String)> {
        lock(&self.copied).clone()
    }

    fn record(&self, call: impl Into<String>) {
        lock(&self.calls).push(call.into());
    }

    fn ensure_created(&self, stack: &ComposeStack) {
        let mut containers = lock(&self.containers);
        for service in Service::iter() {
            let container = stack.container_name(service);
            if !containers.iter().any(|c| c.container == container) {
                containers.push(ServiceStatus {
                    service: service.to_string(),
                    container,
                    state: ContainerState::Created,
                });
            }
        }
        drop(containers);

        let volume = stack.volume_name(DB_VOLUME);
        let mut volumes = lock(&self.volumes);
        if !volumes.contains(&volume) {
            volumes.push(volume);
        }
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn status(&self, _stack: &ComposeStack) -> Result<Vec<ServiceStatus>> {
        self.record("status");
        Ok(self.containers())
    }

    async fn create(&self, stack: &ComposeStack) -> Result<()> {
        self.record("create");
        self.ensure_created(stack);
        Ok(())
    }

    async fn up(&self, stack: &ComposeStack) -> Result<()> {
        self.record("up");
        self.ensure_created(stack);
        for c in lock(&self.containers).iter_mut() {
            c.state = ContainerState::Running;
        }
        Ok(())
    }

    async fn stop(&self, _stack: &ComposeStack) -> Result<()> {
        self.record("stop");
        for c in lock(&self.containers).iter_mut() {
            c.state = ContainerState::Exited;
        }
        Ok(())
    }

    async fn down(&self, stack: &ComposeStack) -> Result<()> {
        self.record("down");
        lock(&self.containers).clear();
        let prefix = format!("{}_", stack.project);
        lock(&self.volumes).retain(|v| !v.starts_with(&prefix));
        Ok(())
    }

    async fn logs(&self, _stack: &ComposeStack) -> Result<String> {
        self.record("logs");
        Ok("api-1  | listening on :4000\n".to_string())
    }

    async fn copy_into_container(&self, container: &str, local: &Path, dest: &Path) -> Result<()> {
        self.record(format!("copy {}", container));
        let exists = lock(&self.containers).iter().any(|c| c.container == container);
        if self.fail_copy.load(Ordering::Relaxed) || !exists {
            anyhow::bail!("No such container: {}", container);
        }
        let contents = std::fs::read_to_string(local)?;
        lock(&self.copied).push((container.to_string(), dest.to_path_buf(), contents));
        Ok(())
    }

    async fn remove_container(&self, container: &str) -> Result<()> {
        self.record(format!("rm {}", container));
        lock(&self.containers).retain(|c| c.container != container);
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<String>> {
        self.record("volumes");
        Ok(self.volumes())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.record(format!("rm-volume {}", name));
        lock(&self.volumes).retain(|v| v != name);
        Ok(())
    }
}
