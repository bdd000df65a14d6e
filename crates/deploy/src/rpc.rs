//! Shared HTTP utilities for the JSON-RPC and GraphQL endpoints the pipeline talks to.

use std::time::Duration;

use anyhow::Context;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

/// Default timeout for requests to the wallet daemon and the indexer.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Proving can take minutes.
const PROVING_TIMEOUT: Duration = Duration::from_secs(600);

/// Create an HTTP client configured for JSON-RPC and GraphQL requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Create an HTTP client for the proof server.
pub fn create_proving_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(PROVING_TIMEOUT)
        .build()
        .context("Failed to create proof server HTTP client")
}

/// Make a JSON-RPC 2.0 call and deserialize the result.
///
/// `params` is sent as-is, so it may be a positional array or a named object.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: impl Serialize,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error in {}: {}",
            method,
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    tracing::trace!(method, result = %result_value, "RPC response");

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Run a GraphQL query and deserialize its `data` field.
pub async fn graphql_query<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    query: &str,
    variables: Value,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "query": query,
            "variables": variables,
        }))
        .send()
        .await
        .context("Failed to send GraphQL request")?
        .error_for_status()
        .context("GraphQL endpoint returned an error status")?;

    let result: Value = response
        .json()
        .await
        .context("Failed to parse GraphQL response")?;

    let errors = result
        .get("errors")
        .and_then(|e| e.as_array())
        .filter(|e| !e.is_empty());
    if let Some(errors) = errors {
        let messages = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::bail!("GraphQL error: {}", messages);
    }

    let data = result.get("data").context("No data in GraphQL response")?.clone();

    serde_json::from_value(data).context("Failed to deserialize GraphQL data")
}

/// Join a path onto a base URL, keeping any path prefix of the base.
pub fn endpoint(base: &Url, path: &str) -> Result<Url, anyhow::Error> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(path.trim_start_matches('/'))
        .with_context(|| format!("Invalid endpoint path '{}' for {}", path, base))
}
