//! Contract runtime bridge.
//!
//! Compiled contracts are JavaScript modules. They are executed by an external runtime
//! executable which builds the unproven transactions for deployments and circuit calls.
//! Requests are written as JSON to its stdin and responses read as JSON from its stdout.

use std::{
    collections::BTreeMap,
    future::Future,
    path::PathBuf,
    process::Stdio,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::{
    keys::KeyPair,
    tx::{ContractAddress, NetworkId},
};

/// Name of the witness returning the admin secret key.
pub const ADMIN_SECRET_WITNESS: &str = "adminSecretKey";

/// Secrets made available to the contract circuits.
///
/// Values never leave the local machine.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct WitnessSet(BTreeMap<String, String>);

impl WitnessSet {
    /// Witnesses of a run: the admin secret key.
    pub fn admin(keys: &KeyPair) -> Self {
        let mut set = Self::default();
        set.insert(ADMIN_SECRET_WITNESS, hex::encode(keys.private_key));
        set
    }

    pub fn insert(&mut self, name: impl Into<String>, value_hex: impl Into<String>) {
        self.0.insert(name.into(), value_hex.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for WitnessSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// A circuit argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ArgumentValue {
    /// Hex-encoded bytes.
    Bytes(String),
    Uint(u64),
    Bool(bool),
    Text(String),
}

/// Request to build a deployment transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub module: PathBuf,
    pub network_id: NetworkId,
    pub coin_public_key: String,
    pub initial_private_state: Value,
    pub witnesses: WitnessSet,
}

/// An unproven deployment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutput {
    /// Unproven ledger transaction, hex encoded.
    pub transaction: String,
    pub contract_address: ContractAddress,
    /// Circuits that must be proven.
    #[serde(default)]
    pub circuits: Vec<String>,
    /// Private state after the constructor ran.
    #[serde(default)]
    pub private_state: Value,
    /// Signing key authorizing later maintenance of the contract.
    pub signing_key: String,
}

/// Request to build a circuit call transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub module: PathBuf,
    pub network_id: NetworkId,
    pub coin_public_key: String,
    pub contract_address: ContractAddress,
    /// Current on-chain state, hex encoded.
    pub contract_state: String,
    pub private_state: Value,
    pub circuit: String,
    pub args: Vec<ArgumentValue>,
    pub witnesses: WitnessSet,
}

/// An unproven circuit call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutput {
    pub transaction: String,
    #[serde(default)]
    pub circuits: Vec<String>,
    #[serde(default)]
    pub private_state: Value,
}

/// Executes compiled contract modules.
pub trait ContractRuntime: Send + Sync {
    fn deploy(
        &self,
        request: &DeployRequest,
    ) -> impl Future<Output = anyhow::Result<DeployOutput>> + Send;

    fn call(&self, request: &CallRequest)
    -> impl Future<Output = anyhow::Result<CallOutput>> + Send;
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum BridgeRequest<'a> {
    Deploy(&'a DeployRequest),
    Call(&'a CallRequest),
}

/// Runtime bridge run as a subprocess, once per request.
#[derive(Debug, Clone)]
pub struct SubprocessRuntime {
    program: PathBuf,
    args: Vec<String>,
}

impl SubprocessRuntime {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    async fn exchange<T: serde::de::DeserializeOwned>(
        &self,
        request: BridgeRequest<'_>,
    ) -> anyhow::Result<T> {
        let input = serde_json::to_vec(&request).context("Failed to encode runtime request")?;

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start runtime {}", self.program.display()))?;

        // A runtime exiting early closes its stdin. The write error is only reported once
        // the exit status and stderr are known.
        let mut stdin = child.stdin.take().context("Runtime stdin unavailable")?;
        let written = stdin.write_all(&input).await;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for runtime")?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            anyhow::bail!("Runtime exited with {}: {}", output.status, stderr.trim());
        }
        if let Err(e) = written {
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to write runtime request: {}", stderr.trim())));
        }

        serde_json::from_slice(&output.stdout).with_context(|| {
            format!(
                "Failed to parse runtime response: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            )
        })
    }
}

impl ContractRuntime for SubprocessRuntime {
    async fn deploy(&self, request: &DeployRequest) -> anyhow::Result<DeployOutput> {
        tracing::debug!(module = %request.module.display(), "Building deploy transaction");
        self.exchange(BridgeRequest::Deploy(request)).await
    }

    async fn call(&self, request: &CallRequest) -> anyhow::Result<CallOutput> {
        tracing::debug!(
            module = %request.module.display(),
            circuit = %request.circuit,
            "Building call transaction"
        );
        self.exchange(BridgeRequest::Call(request)).await
    }
}
