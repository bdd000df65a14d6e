use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use nightcap_deploy::{DEFAULT_CONFIG_FILENAME, NetworkId};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "nightcap")]
#[command(
    author,
    version,
    about = "Compile, fund and deploy contracts to a Midnight network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "NIGHTCAP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile and deploy every contract of a configuration file.
    Deploy(DeployArgs),

    /// Print a new random deployer seed, formatted for a `.env` file.
    GenerateSeed,
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// Path to the deployment configuration, or to a directory containing `nightcap.toml`.
    #[arg(short, long, env = "NIGHTCAP_CONFIG", default_value = DEFAULT_CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Deploy with a freshly generated seed.
    ///
    /// The new wallet has to be funded before the deployment can proceed.
    #[arg(short, long = "quick-deploy", alias = "quick")]
    pub quick: bool,

    /// The deployer seed (64 hexadecimal characters).
    ///
    /// Takes precedence over quick mode, the config file and DEPLOYER_HEX_SEED.
    #[arg(short, long)]
    pub seed: Option<String>,

    /// Where to write the deployment record.
    ///
    /// Defaults to `storage.output` from the config file (deployments.json).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// The network to deploy to, overriding `network.id` from the config file.
    #[arg(long)]
    pub network: Option<NetworkId>,

    /// How long to wait for the wallet to be funded, in seconds.
    #[arg(long)]
    pub funding_timeout: Option<u64>,
}

impl DeployArgs {
    /// Directory of the config file, where a `.env` file may live.
    pub fn config_dir(&self) -> PathBuf {
        if self.config.is_dir() {
            return self.config.clone();
        }

        match self.config.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}
