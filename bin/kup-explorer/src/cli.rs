use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// RPC endpoint queried when neither the flags nor the settings name one.
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

#[derive(Parser)]
#[command(name = "kup-explorer")]
#[command(
    author,
    version,
    about = "Run a block explorer next to your kupcake network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "KUP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a TOML settings file.
    ///
    /// Every setting can also be provided through `KUP_EXPLORER_*` environment variables.
    #[arg(long, alias = "conf", global = true, env = "KUP_EXPLORER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides the data directory of the explorer.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// RPC URL of the network to index.
    ///
    /// If not provided, the network of the settings file is used, then `http://localhost:8545`.
    #[arg(long, global = true, env = "KUP_EXPLORER_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Chain ID of the network to index.
    ///
    /// If not provided, it is queried from the RPC endpoint.
    #[arg(long, global = true, env = "KUP_EXPLORER_CHAIN_ID")]
    pub chain_id: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Provision the explorer stack and create its containers.
    Install {
        /// Clone the upstream repository and deploy its latest tag.
        #[arg(long)]
        from_source: bool,
    },
    /// Start the explorer.
    Start {
        /// Discard the indexed state before starting.
        #[arg(long)]
        reset: bool,
        /// Wait until the indexer caught up with the network.
        #[arg(long)]
        wait: bool,
    },
    /// Wait until the indexer caught up with the network.
    Wait {
        /// Give up after this many attempts.
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Stop the explorer containers.
    Stop,
    /// Remove the explorer containers and volumes.
    Clean,
    /// Remove the explorer and install it again.
    Update,
    /// Show the state of the explorer containers.
    Status,
    /// Print the logs of the explorer containers.
    Logs,
    /// Print the endpoints exposed by the explorer.
    Info,
}
