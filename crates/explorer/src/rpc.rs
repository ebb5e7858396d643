//! Shared HTTP and JSON-RPC utilities.

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde_json::{Value, json};

/// Timeout of a single HTTP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client shared by the node and indexer queries.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build the HTTP client")
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

/// Call a parameterless JSON-RPC `method` on `url` and return its `result`.
pub async fn call(client: &reqwest::Client, url: &str, method: &str) -> Result<Value, anyhow::Error> {
    let request = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": [] });

    let response: RpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .with_context(|| format!("{} request to {} failed", method, url))?
        .json()
        .await
        .with_context(|| format!("Malformed {} response from {}", method, url))?;

    match response {
        RpcResponse {
            error: Some(err), ..
        } => anyhow::bail!("{} returned error {}: {}", method, err.code, err.message),
        RpcResponse {
            result: Some(result),
            ..
        } => Ok(result),
        _ => anyhow::bail!("{} response has no result", method),
    }
}

/// Fetch a JSON document with a plain GET request.
pub async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value, anyhow::Error> {
    client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to send GET {}", url))?
        .error_for_status()
        .with_context(|| format!("GET {} returned an error status", url))?
        .json()
        .await
        .with_context(|| format!("Failed to parse response of GET {}", url))
}

/// Parse a quantity as returned by Ethereum JSON-RPC (`0x`-prefixed hex) or a plain
/// decimal number.
pub fn parse_quantity(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) if !hex.is_empty() => u64::from_str_radix(hex, 16).ok(),
            Some(_) => None,
            None => s.parse().ok(),
        },
        _ => None,
    }
}
