//! Error taxonomy for the deployment pipeline.

use std::{process::ExitStatus, time::Duration};

/// Result alias used by every pipeline stage.
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

/// A fatal error raised by one of the pipeline stages.
///
/// Every stage error propagates untouched to the orchestrator, which reports it
/// against the contract being processed and stops the run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// No seed was supplied by the CLI, quick mode, the config file or the environment.
    #[error(
        "Deployer hex seed not found. Use --quick-deploy, --seed, set `deployer_seed` in the config or DEPLOYER_HEX_SEED in .env"
    )]
    MissingSeed,

    /// The resolved seed is not exactly 64 hexadecimal characters.
    #[error("Invalid deployer hex seed format: {reason}. Must be 64 hexadecimal characters")]
    InvalidSeedFormat { reason: String },

    /// The configuration file is missing, malformed or inconsistent.
    #[error("Invalid configuration: {0:#}")]
    Config(anyhow::Error),

    /// The contract compiler could not be run or exited unsuccessfully.
    #[error("Failed to compile contract '{contract}' ({status}):\n{output}")]
    Compilation {
        contract: String,
        status: CompilerStatus,
        output: String,
    },

    /// The wallet session could not be opened, observed or closed.
    #[error("Wallet session error: {0:#}")]
    WalletSession(anyhow::Error),

    /// The wallet never observed enough funds before the funding deadline.
    #[error(
        "Timed out after {waited:?} waiting for a balance above {threshold} (last observed: {observed})"
    )]
    FundingTimeout {
        threshold: u128,
        observed: u128,
        waited: Duration,
    },

    /// The run was cancelled while a stage was suspended.
    #[error("Deployment cancelled")]
    Cancelled,

    /// One of the providers needed for publication could not be set up.
    #[error("Failed to configure providers: {0:#}")]
    ProviderConfig(anyhow::Error),

    /// The contract deployment transaction failed.
    #[error("Failed to deploy contract '{contract}': {cause:#}")]
    Publication {
        contract: String,
        cause: anyhow::Error,
    },

    /// The initialization entry point call failed.
    #[error("Failed to initialize contract '{contract}' via '{entry_point}': {cause:#}")]
    Initialization {
        contract: String,
        entry_point: String,
        cause: anyhow::Error,
    },

    /// The deployment record could not be written.
    #[error("Failed to persist deployments: {0:#}")]
    Persistence(anyhow::Error),
}

impl DeployError {
    pub(crate) fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(anyhow::anyhow!("{msg}"))
    }

    pub(crate) fn publication(contract: &str, cause: anyhow::Error) -> Self {
        Self::Publication {
            contract: contract.to_string(),
            cause,
        }
    }

    pub(crate) fn initialization(contract: &str, entry_point: &str, cause: anyhow::Error) -> Self {
        Self::Initialization {
            contract: contract.to_string(),
            entry_point: entry_point.to_string(),
            cause,
        }
    }
}

/// How a compiler invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerStatus {
    /// The compiler binary could not be started.
    NotStarted,
    /// The compiler ran and exited with the given status.
    Exited(ExitStatus),
    /// The compiler exited successfully but the artifact is incomplete.
    IncompleteArtifact,
}

impl std::fmt::Display for CompilerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => f.write_str("compiler could not be started"),
            Self::Exited(status) => write!(f, "compiler {status}"),
            Self::IncompleteArtifact => f.write_str("incomplete artifact"),
        }
    }
}
