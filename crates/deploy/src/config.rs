//! Deployment configuration.
//!
//! The configuration is a TOML file layered under `NIGHTCAP_`-prefixed environment
//! variables (nested keys are separated by `__`, e.g. `NIGHTCAP_NETWORK__PROOF_SERVER_URL`).

use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{DeployError, Result},
    tx::NetworkId,
};

/// The default name for the deployment configuration file.
pub const DEFAULT_CONFIG_FILENAME: &str = "nightcap.toml";

/// Prefix of environment variables overriding config values.
pub const ENV_PREFIX: &str = "NIGHTCAP_";

/// Default indexer GraphQL endpoint.
pub const DEFAULT_INDEXER_URL: &str = "https://indexer.testnet-02.midnight.network/api/v1/graphql";
/// Default indexer GraphQL subscription endpoint.
pub const DEFAULT_INDEXER_WS_URL: &str =
    "wss://indexer.testnet-02.midnight.network/api/v1/graphql/ws";
/// Default proof server endpoint.
pub const DEFAULT_PROOF_SERVER_URL: &str = "http://localhost:6300";
/// Default ledger node RPC endpoint.
pub const DEFAULT_NODE_URL: &str = "https://rpc.testnet-02.midnight.network";
/// Default wallet daemon JSON-RPC endpoint.
pub const DEFAULT_WALLET_RPC_URL: &str = "http://localhost:9988";

/// Default compiler executable.
pub const DEFAULT_COMPILER: &str = "compactc";
/// Default contract runtime bridge executable.
pub const DEFAULT_RUNTIME: &str = "compact-runtime";

/// Balance the wallet must strictly exceed before publishing, in minimal units.
pub const DEFAULT_MIN_BALANCE: u128 = 1_000_000;
/// Default funding wait timeout.
pub const DEFAULT_FUNDING_TIMEOUT_SECS: u64 = 1800;
/// Identifier of the native token.
pub const NATIVE_TOKEN: &str = "02000000000000000000000000000000000000000000000000000000000000000000";

/// Default private state store name.
pub const DEFAULT_PRIVATE_STATE_STORE: &str = "deployer-private-store";
/// Default deployment record file.
pub const DEFAULT_OUTPUT: &str = "deployments.json";

/// Top-level deployment configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Hex seed of the deployer (optional, see [`crate::seed::SeedInputs`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer_seed: Option<String>,
    /// Network endpoints.
    #[serde(default)]
    pub network: NetworkConfig,
    /// External executables.
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Funding wait parameters.
    #[serde(default)]
    pub funding: FundingConfig,
    /// Local storage locations.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Contracts to deploy, in deployment order.
    pub contracts: Vec<ContractConfig>,

    /// Directory of the config file; contract paths are relative to it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployConfig")
            .field("deployer_seed", &self.deployer_seed.as_ref().map(|_| "<redacted>"))
            .field("network", &self.network)
            .field("toolchain", &self.toolchain)
            .field("funding", &self.funding)
            .field("storage", &self.storage)
            .field("contracts", &self.contracts)
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

/// Network endpoints used by the wallet and the providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network the contracts are deployed to.
    pub id: NetworkId,
    /// Indexer GraphQL query endpoint.
    pub indexer_url: Url,
    /// Indexer GraphQL subscription endpoint.
    pub indexer_ws_url: Url,
    /// Proof server endpoint.
    pub proof_server_url: Url,
    /// Ledger node RPC endpoint.
    pub node_url: Url,
    /// Wallet daemon JSON-RPC endpoint.
    pub wallet_rpc_url: Url,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            id: NetworkId::TestNet,
            indexer_url: Url::parse(DEFAULT_INDEXER_URL).expect("valid default URL"),
            indexer_ws_url: Url::parse(DEFAULT_INDEXER_WS_URL).expect("valid default URL"),
            proof_server_url: Url::parse(DEFAULT_PROOF_SERVER_URL).expect("valid default URL"),
            node_url: Url::parse(DEFAULT_NODE_URL).expect("valid default URL"),
            wallet_rpc_url: Url::parse(DEFAULT_WALLET_RPC_URL).expect("valid default URL"),
        }
    }
}

/// External executables invoked by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// The contract compiler.
    pub compiler: PathBuf,
    /// Extra arguments passed to the compiler before the source and output paths.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compiler_args: Vec<String>,
    /// The contract runtime bridge.
    pub runtime: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: PathBuf::from(DEFAULT_COMPILER),
            compiler_args: Vec::new(),
            runtime: PathBuf::from(DEFAULT_RUNTIME),
        }
    }
}

/// Parameters of the funding wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingConfig {
    /// The native balance must be strictly greater than this value.
    pub min_balance: u128,
    /// How long to wait for funds, in seconds.
    pub timeout_secs: u64,
    /// Token whose balance is checked.
    pub token: String,
    /// Interval between wallet state refreshes, in milliseconds.
    pub poll_interval_ms: u64,
}

impl FundingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            min_balance: DEFAULT_MIN_BALANCE,
            timeout_secs: DEFAULT_FUNDING_TIMEOUT_SECS,
            token: NATIVE_TOKEN.to_string(),
            poll_interval_ms: 2000,
        }
    }
}

/// Local storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Name of the private state store.
    pub private_state_store: String,
    /// Directory holding private state stores.
    pub private_state_dir: PathBuf,
    /// Where the deployment record is written.
    pub output: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            private_state_store: DEFAULT_PRIVATE_STATE_STORE.to_string(),
            private_state_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from(".nightcap"))
                .join("nightcap"),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

/// One contract to compile and deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Unique name of the contract within the run.
    pub name: String,
    /// Path of the contract source, relative to the config file.
    pub path: PathBuf,
    /// Entry point to call right after deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<InitConfig>,
}

/// Initialization call performed after deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitConfig {
    /// Name of the circuit to call.
    pub entry_point: String,
    /// Arguments, in the entry point's declared parameter order.
    #[serde(default)]
    pub args: Vec<InitArg>,
}

/// A named argument of the initialization call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitArg {
    /// Declared parameter name.
    pub name: String,
    /// Where the value comes from.
    #[serde(flatten)]
    pub value: ArgSource,
}

/// Value expression of an initialization argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgSource {
    /// Key material of the run's admin key pair.
    Key(KeyRef),
    /// Hex-encoded bytes.
    Bytes(String),
    /// Unsigned integer.
    Uint(u64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 text.
    Text(String),
}

/// Reference to the run's admin key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeyRef {
    AdminPublicKey,
    AdminPrivateKey,
}

impl DeployConfig {
    /// Load the configuration from a TOML file, or from [`DEFAULT_CONFIG_FILENAME`] in a
    /// directory, applying environment overrides.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeployError::config(format!(
                "Configuration file or directory not found: {}",
                path.display()
            )));
        }

        let config_path = if path.is_dir() {
            path.join(DEFAULT_CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let mut config: Self = Figment::new()
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| {
                DeployError::Config(anyhow::Error::new(e).context(format!(
                    "Failed to parse config file {}",
                    config_path.display()
                )))
            })?;

        config.base_dir = match config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        config.validate()?;

        tracing::info!(
            path = %config_path.display(),
            network = %config.network.id,
            contracts = config.contracts.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Check the invariants that do not depend on compiled artifacts.
    pub fn validate(&self) -> Result<()> {
        if self.contracts.is_empty() {
            return Err(DeployError::config("No contracts configured"));
        }
        if self.funding.poll_interval_ms == 0 {
            return Err(DeployError::config(
                "funding.poll_interval_ms must be greater than zero",
            ));
        }

        let mut names = HashSet::new();
        for contract in &self.contracts {
            if contract.name.trim().is_empty() {
                return Err(DeployError::config("Contract name must not be empty"));
            }
            // Names are used as the compiled artifact directory.
            if contract.name.contains(['/', '\\']) || matches!(contract.name.as_str(), "." | "..") {
                return Err(DeployError::config(format!(
                    "Contract name '{}' must not contain path separators",
                    contract.name
                )));
            }
            if !names.insert(contract.name.as_str()) {
                return Err(DeployError::config(format!(
                    "Contract name '{}' is used more than once",
                    contract.name
                )));
            }
            if contract.path.as_os_str().is_empty() {
                return Err(DeployError::config(format!(
                    "Contract '{}' has an empty source path",
                    contract.name
                )));
            }
            if let Some(init) = &contract.init {
                init.validate()
                    .map_err(|e| DeployError::Config(e.context(format!("Contract '{}'", contract.name))))?;
            }
        }

        Ok(())
    }

    /// Absolute or config-relative source path of a contract.
    pub fn source_path(&self, contract: &ContractConfig) -> PathBuf {
        self.base_dir.join(&contract.path)
    }
}

impl InitConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.entry_point.trim().is_empty() {
            anyhow::bail!("Init entry point must not be empty");
        }

        let mut names = HashSet::new();
        for arg in &self.args {
            if arg.name.trim().is_empty() {
                anyhow::bail!("Init argument names must not be empty");
            }
            if !names.insert(arg.name.as_str()) {
                anyhow::bail!("Init argument '{}' is given more than once", arg.name);
            }
            if let ArgSource::Bytes(value) = &arg.value {
                hex::decode(value.trim_start_matches("0x")).map_err(|e| {
                    anyhow::anyhow!("Init argument '{}' is not valid hex: {}", arg.name, e)
                })?;
            }
        }

        Ok(())
    }
}
