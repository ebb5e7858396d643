//! Target network resolution.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::rpc;

/// Identity of the blockchain network the stack indexes.
///
/// Two descriptors describe the same installation target only if both the chain
/// id and the RPC URL are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub chain_id: u64,
    pub rpc_url: String,
}

impl NetworkDescriptor {
    pub fn new(chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id,
            rpc_url: rpc_url.into(),
        }
    }
}

impl std::fmt::Display for NetworkDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chain {} at {}", self.chain_id, self.rpc_url)
    }
}

/// Provides the network currently configured on the host.
#[async_trait]
pub trait NetworkResolver: Send + Sync {
    async fn node_info(&self) -> anyhow::Result<NetworkDescriptor>;
}

/// A fixed network, e.g. given on the command line.
#[derive(Debug, Clone)]
pub struct StaticNetworkResolver(pub NetworkDescriptor);

#[async_trait]
impl NetworkResolver for StaticNetworkResolver {
    async fn node_info(&self) -> anyhow::Result<NetworkDescriptor> {
        Ok(self.0.clone())
    }
}

/// Resolves the chain id by asking the node behind `rpc_url` (`eth_chainId`).
#[derive(Debug, Clone)]
pub struct RpcNetworkResolver {
    client: reqwest::Client,
    rpc_url: String,
}

impl RpcNetworkResolver {
    pub fn new(rpc_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: rpc::create_client()?,
            rpc_url: rpc_url.into(),
        })
    }
}

#[async_trait]
impl NetworkResolver for RpcNetworkResolver {
    async fn node_info(&self) -> anyhow::Result<NetworkDescriptor> {
        let raw = rpc::call(&self.client, &self.rpc_url, "eth_chainId")
            .await
            .with_context(|| format!("Failed to query chain id from {}", self.rpc_url))?;

        let chain_id = rpc::parse_quantity(&raw)
            .with_context(|| format!("Invalid eth_chainId result: {}", raw))?;

        tracing::debug!(chain_id, rpc_url = %self.rpc_url, "Resolved target network");

        Ok(NetworkDescriptor::new(chain_id, self.rpc_url.clone()))
    }
}
