//! Readiness monitoring: waits until the indexer has caught up with the network.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::{error::ModuleError, rpc};

/// Path of the indexer status endpoint, relative to the API URL.
pub const INDEXER_STATUS_PATH: &str = "/api/v1/status";

/// A source of a block height.
#[async_trait]
pub trait HeightSource: Send + Sync {
    async fn latest_height(&self) -> Result<u64>;
}

/// Latest block indexed by the explorer API.
#[derive(Debug, Clone)]
pub struct IndexerApi {
    client: reqwest::Client,
    status_url: String,
}

impl IndexerApi {
    pub fn new(api_url: &str) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client()?,
            status_url: format!("{}{}", api_url.trim_end_matches('/'), INDEXER_STATUS_PATH),
        })
    }
}

#[async_trait]
impl HeightSource for IndexerApi {
    async fn latest_height(&self) -> Result<u64> {
        let body = rpc::get_json(&self.client, &self.status_url).await?;
        body.get("latestBlock")
            .and_then(rpc::parse_quantity)
            .with_context(|| format!("Unexpected indexer status: {}", body))
    }
}

/// Latest block of the target network (`eth_blockNumber`).
#[derive(Debug, Clone)]
pub struct ChainRpc {
    client: reqwest::Client,
    rpc_url: String,
}

impl ChainRpc {
    pub fn new(rpc_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client()?,
            rpc_url: rpc_url.into(),
        })
    }
}

#[async_trait]
impl HeightSource for ChainRpc {
    async fn latest_height(&self) -> Result<u64> {
        let raw: Value =
            rpc::call(&self.client, &self.rpc_url, "eth_blockNumber")
                .await
                .map_err(|e| ModuleError::TargetHeightUnavailable(format!("{:#}", e)))?;

        Ok(rpc::parse_quantity(&raw).ok_or_else(|| ModuleError::InvalidBlockHeight(raw.to_string()))?)
    }
}

/// Retry policy of [`wait_for_convergence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Delay between two attempts.
    pub interval: Duration,
    /// Upper bound on attempts. `None` polls until convergence.
    pub max_attempts: Option<u32>,
}

impl ReadinessPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }
}

/// Progress reported by [`wait_for_convergence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessEvent {
    /// The indexer API did not answer; it will be asked again.
    IndexerUnavailable { attempt: u32 },
    /// The indexer is behind the network.
    Syncing { indexed: u64, target: u64 },
    /// The indexer reached the network height.
    Converged { height: u64 },
}

/// Poll until the indexed height equals the network height.
///
/// Indexer failures are retried after `policy.interval` without limit (other than
/// `policy.max_attempts`). A failed or malformed network height aborts at once.
/// Returns the converged height.
pub async fn wait_for_convergence(
    indexer: &dyn HeightSource,
    chain: &dyn HeightSource,
    policy: ReadinessPolicy,
    on_event: &mut (dyn FnMut(ReadinessEvent) + Send),
) -> Result<u64> {
    let mut attempt = 0u32;

    loop {
        if let Some(max) = policy.max_attempts
            && attempt >= max
        {
            return Err(ModuleError::ReadinessAttemptsExhausted(max).into());
        }
        attempt += 1;

        let indexed = match indexer.latest_height().await {
            Ok(height) => height,
            Err(e) => {
                tracing::trace!(attempt, error = %format!("{:#}", e), "Indexer not ready");
                on_event(ReadinessEvent::IndexerUnavailable { attempt });
                tokio::time::sleep(policy.interval).await;
                continue;
            }
        };

        let target = chain
            .latest_height()
            .await
            .context("Failed to read the target network height")?;

        if indexed == target {
            on_event(ReadinessEvent::Converged { height: target });
            return Ok(target);
        }

        on_event(ReadinessEvent::Syncing { indexed, target });
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeHeights;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    /// Read one HTTP request, headers and body.
    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Serve `body` as a JSON response to every request. Returns the base URL.
    async fn serve_json(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                read_request(&mut stream).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_chain_rpc_reads_hex_height() {
        let url = serve_json(r#"{"jsonrpc":"2.0","id":1,"result":"0x2a"}"#).await;
        assert_eq!(ChainRpc::new(url).unwrap().latest_height().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_chain_rpc_rejects_garbage_height() {
        let url = serve_json(r#"{"jsonrpc":"2.0","id":1,"result":"0xzz"}"#).await;
        let err = ChainRpc::new(url).unwrap().latest_height().await.unwrap_err();
        match err.downcast_ref::<ModuleError>() {
            Some(ModuleError::InvalidBlockHeight(raw)) => assert!(raw.contains("0xzz")),
            other => panic!("expected an invalid height, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chain_rpc_error_member_is_unavailable() {
        let url = serve_json(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#,
        )
        .await;
        let err = ChainRpc::new(url).unwrap().latest_height().await.unwrap_err();
        match err.downcast_ref::<ModuleError>() {
            Some(ModuleError::TargetHeightUnavailable(msg)) => {
                assert!(msg.contains("method not found"))
            }
            other => panic!("expected an unavailable height, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chain_rpc_unreachable_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = ChainRpc::new(url).unwrap().latest_height().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModuleError>(),
            Some(ModuleError::TargetHeightUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_indexer_api_reads_latest_block() {
        let url = serve_json(r#"{"latestBlock":"120","syncing":true}"#).await;
        let indexer = IndexerApi::new(&format!("{}/", url)).unwrap();
        assert_eq!(indexer.latest_height().await.unwrap(), 120);
    }

    #[tokio::test]
    async fn test_indexer_api_without_latest_block_fails() {
        let url = serve_json("{}").await;
        let err = IndexerApi::new(&url).unwrap().latest_height().await.unwrap_err();
        assert!(err.to_string().contains("Unexpected indexer status"));
    }

    const INTERVAL: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn test_converges_exactly_when_heights_match() {
        let indexer = FakeHeights::sequence([Err("connection refused"), Ok(5), Ok(9), Ok(10)]);
        let chain = FakeHeights::constant(10);
        let mut events = Vec::new();

        let start = tokio::time::Instant::now();
        let height = wait_for_convergence(
            &indexer,
            &chain,
            ReadinessPolicy::unbounded(INTERVAL),
            &mut |e| events.push(e),
        )
        .await
        .unwrap();

        assert_eq!(height, 10);
        assert_eq!(
            events,
            vec![
                ReadinessEvent::IndexerUnavailable { attempt: 1 },
                ReadinessEvent::Syncing { indexed: 5, target: 10 },
                ReadinessEvent::Syncing { indexed: 9, target: 10 },
                ReadinessEvent::Converged { height: 10 },
            ]
        );
        assert_eq!(indexer.calls(), 4);
        assert_eq!(chain.calls(), 3);
        assert_eq!(start.elapsed(), INTERVAL * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborts_on_malformed_target_height() {
        let indexer = FakeHeights::constant(3);
        let chain = FakeHeights::failing_with(ModuleError::InvalidBlockHeight("\"0xzz\"".into()));

        let err = wait_for_convergence(
            &indexer,
            &chain,
            ReadinessPolicy::unbounded(INTERVAL),
            &mut |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ModuleError>(),
            Some(ModuleError::InvalidBlockHeight(raw)) if raw.contains("0xzz")
        ));
        assert_eq!(indexer.calls(), 1);
        assert_eq!(chain.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborts_on_unreachable_target() {
        let indexer = FakeHeights::constant(3);
        let chain = FakeHeights::failing_with(ModuleError::TargetHeightUnavailable(
            "connection refused".into(),
        ));

        let err = wait_for_convergence(
            &indexer,
            &chain,
            ReadinessPolicy::unbounded(INTERVAL),
            &mut |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ModuleError>(),
            Some(ModuleError::TargetHeightUnavailable(_))
        ));
        assert_eq!(chain.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_retrying_unavailable_indexer() {
        let indexer = FakeHeights::sequence([Err("503 Service Unavailable")]);
        let chain = FakeHeights::constant(10);
        let policy = ReadinessPolicy {
            interval: INTERVAL,
            max_attempts: Some(25),
        };

        let err = wait_for_convergence(&indexer, &chain, policy, &mut |_| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ModuleError>(),
            Some(ModuleError::ReadinessAttemptsExhausted(25))
        ));
        assert_eq!(indexer.calls(), 25);
        assert_eq!(chain.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_convergence_does_not_sleep() {
        let indexer = FakeHeights::constant(42);
        let chain = FakeHeights::constant(42);

        let start = tokio::time::Instant::now();
        let height = wait_for_convergence(
            &indexer,
            &chain,
            ReadinessPolicy::unbounded(INTERVAL),
            &mut |_| {},
        )
        .await
        .unwrap();

        assert_eq!(height, 42);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
