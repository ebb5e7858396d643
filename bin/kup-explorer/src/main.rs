//! kup-explorer runs a block explorer for a kupcake network.

mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use comfy_table::Table;

use cli::{Cli, Command, DEFAULT_RPC_URL};
use kupcake_explorer::{
    ExplorerModule, ModuleSettings, NetworkDescriptor, NetworkResolver, ReadinessPolicy,
    RpcNetworkResolver, StaticNetworkResolver,
};

/// Pick the network from the flags, then the settings, then the default endpoint.
fn network_resolver(cli: &Cli, settings: &ModuleSettings) -> Result<Arc<dyn NetworkResolver>> {
    let rpc_url = cli
        .rpc_url
        .clone()
        .or_else(|| settings.network.as_ref().map(|n| n.rpc_url.clone()))
        .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

    let chain_id = cli.chain_id.or_else(|| {
        settings
            .network
            .as_ref()
            .filter(|n| n.rpc_url == rpc_url)
            .map(|n| n.chain_id)
    });

    Ok(match chain_id {
        Some(chain_id) => Arc::new(StaticNetworkResolver(NetworkDescriptor::new(
            chain_id, rpc_url,
        ))),
        None => Arc::new(RpcNetworkResolver::new(rpc_url)?),
    })
}

async fn print_status(module: &ExplorerModule) -> Result<()> {
    let services = module.status().await?;
    if services.is_empty() {
        println!("Explorer is not installed");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Service", "Container", "State"]);
    for service in &services {
        table.add_row(vec![
            service.service.clone(),
            service.container.clone(),
            service.state.to_string(),
        ]);
    }
    println!("{table}");

    if let Some(version) = module.version()? {
        println!("Installed version: {}", version);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut settings = ModuleSettings::load(cli.config.as_deref())?;
    if let Some(data_dir) = &cli.data_dir {
        settings.data_dir = data_dir.clone();
    }

    let network = network_resolver(&cli, &settings)?;
    let poll_interval = settings.poll_interval();
    let module = ExplorerModule::local(settings, network);

    match cli.command {
        Command::Install { from_source } => {
            let version = module.install(from_source).await?;
            tracing::info!(%version, "Run `kup-explorer start` to launch the explorer");
        }
        Command::Start { reset, wait } => {
            module.start(reset).await?;
            if wait {
                module
                    .wait_until_ready(ReadinessPolicy::unbounded(poll_interval))
                    .await?;
            }
            println!("{}", module.startup_info()?);
        }
        Command::Wait { max_attempts } => {
            let height = module
                .wait_until_ready(ReadinessPolicy {
                    interval: poll_interval,
                    max_attempts,
                })
                .await?;
            println!("Explorer is synced at block {}", height);
        }
        Command::Stop => module.stop().await?,
        Command::Clean => module.clean().await?,
        Command::Update => {
            let version = module.update().await?;
            tracing::info!(%version, "Explorer updated");
        }
        Command::Status => print_status(&module).await?,
        Command::Logs => print!("{}", module.logs().await?),
        Command::Info => println!("{}", module.startup_info()?),
    }

    Ok(())
}
