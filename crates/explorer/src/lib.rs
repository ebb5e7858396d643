//! kupcake-explorer - Lifecycle controller of a block explorer stack.
//!
//! This crate installs, starts, monitors and tears down the explorer of a
//! kupcake network: an indexing API, its worker, a database and a front-end,
//! run as one compose project next to the node it indexes.

pub mod command;
pub mod compose;
mod controller;
pub mod docker;
pub mod error;
mod fs;
pub mod git;
pub mod network;
pub mod provision;
pub mod readiness;
pub mod rpc;
pub mod runtime_config;
pub mod settings;
pub mod store;
pub mod version;

#[cfg(test)]
mod test_utils;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use compose::{ComposeStack, ContainerState, DockerCompose, Orchestrator, Service, ServiceStatus};
pub use controller::{ExplorerModule, StartupInfo};
pub use docker::ExplorerDocker;
pub use error::ModuleError;
pub use git::{GitCli, VersionControl};
pub use network::{NetworkDescriptor, NetworkResolver, RpcNetworkResolver, StaticNetworkResolver};
pub use readiness::{ReadinessEvent, ReadinessPolicy};
pub use settings::ModuleSettings;
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore, ModuleConfig};
pub use version::{VersionResolver, VersionTag, compare_versions};
