//! nightcap is a CLI tool to compile, fund and deploy contracts in one command.

mod cli;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command, DeployArgs};
use nightcap_deploy::{
    CompactCompiler, DeployConfig, DeployerSeed, DeploymentReport, Pipeline, RemoteNetwork,
    SeedInputs, SubprocessRuntime, seed::SEED_ENV_VAR,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Command::Deploy(args) => deploy(args).await,
        Command::GenerateSeed => {
            println!("{}={}", SEED_ENV_VAR, DeployerSeed::random().to_hex());
            Ok(())
        }
    }
}

async fn deploy(args: DeployArgs) -> Result<()> {
    load_env_files(&args.config_dir());

    let mut config = DeployConfig::load_from_file(&args.config)?;
    if let Some(output) = args.output {
        config.storage.output = output;
    }
    if let Some(network) = args.network {
        config.network.id = network;
    }
    if let Some(timeout) = args.funding_timeout {
        config.funding.timeout_secs = timeout;
    }

    let seeds = SeedInputs {
        cli: args.seed,
        quick: args.quick,
        config: None,
        env: std::env::var(SEED_ENV_VAR).ok(),
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling deployment...");
                cancel.cancel();
            }
        }
    });

    let network = RemoteNetwork::new(config.network.clone(), config.funding.clone());
    let compiler = CompactCompiler::from_config(&config.toolchain);
    let runtime = SubprocessRuntime::new(config.toolchain.runtime.clone());

    let report = Pipeline::new(config, network, compiler, runtime)
        .with_cancellation(cancel)
        .run(seeds)
        .await?;

    print_summary(&report);

    Ok(())
}

/// Load `.env` files from the executable directory, then from the config directory.
///
/// Variables already set take precedence.
fn load_env_files(config_dir: &Path) {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    for dir in exe_dir.iter().map(|d| d.as_path()).chain([config_dir]) {
        let path = dir.join(".env");
        if !path.is_file() {
            continue;
        }

        match dotenvy::from_path(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Loaded environment file"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to load environment file"),
        }
    }
}

fn print_summary(report: &DeploymentReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "Address", "Init transaction"]);

    for contract in &report.contracts {
        table.add_row(vec![
            contract.name.clone(),
            contract.address.to_string(),
            contract
                .init_tx
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    tracing::info!("✓ Deployment complete!");
    tracing::info!(
        network = %report.network,
        admin_public_key = %report.admin_public_key,
        "Deployments saved to {}",
        report.output.display()
    );
    println!("{table}");
}
