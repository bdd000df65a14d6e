//! nightcap-deploy - Contract deployment pipeline.
//!
//! This crate compiles contracts, funds a deployer wallet, publishes each contract to the
//! network, optionally calls an initialization circuit and records the resulting
//! addresses.

pub mod compiler;
pub mod config;
pub mod contract;
pub mod error;
mod fs;
pub mod init;
pub mod keys;
pub mod pipeline;
pub mod providers;
pub mod record;
mod rpc;
pub mod runtime;
pub mod seed;
pub mod tx;
pub mod wallet;

pub use compiler::{CompactCompiler, CompiledArtifact, ContractCompiler};
pub use config::{DEFAULT_CONFIG_FILENAME, DeployConfig};
pub use contract::DeployedContract;
pub use error::{DeployError, Result};
pub use keys::KeyPair;
pub use pipeline::{ContractOutcome, DeploymentReport, Pipeline, Stage};
pub use providers::{Network, ProviderBundle, RemoteNetwork};
pub use record::DeploymentRecord;
pub use runtime::{ContractRuntime, SubprocessRuntime};
pub use seed::{DeployerSeed, SeedInputs, SeedSource};
pub use tx::NetworkId;
pub use wallet::WalletSession;
