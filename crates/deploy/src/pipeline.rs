//! The deployment pipeline.
//!
//! For each configured contract, strictly in order:
//!
//! compile -> open wallet -> wait for funds -> build providers -> publish -> initialize
//!
//! and once every contract went through, the deployment record is written. The first
//! failing stage stops the run and nothing is written.

use std::{future::Future, path::PathBuf};

use tokio_util::sync::CancellationToken;

use crate::{
    compiler::{CompiledArtifact, ContractCompiler},
    config::{ContractConfig, DeployConfig},
    contract::{self, DeployedContract},
    error::{DeployError, Result},
    init::{self, InitPlan},
    keys::KeyPair,
    providers::{Network, ProviderBundle},
    record::DeploymentRecord,
    runtime::{ContractRuntime, WitnessSet},
    seed::{DeployerSeed, SeedInputs, SeedSource},
    tx::{ContractAddress, NetworkId, TransactionId},
    wallet::{WalletSession, wait_for_funds},
};

/// A pipeline stage, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Credentials,
    Compile,
    OpenWallet,
    WaitForFunds,
    BuildProviders,
    Publish,
    Initialize,
    Persist,
}

/// Outcome of one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractOutcome {
    pub name: String,
    pub address: ContractAddress,
    pub deploy_tx: TransactionId,
    /// Transaction of the init call, when one is configured.
    pub init_tx: Option<TransactionId>,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReport {
    pub network: NetworkId,
    pub seed_source: SeedSource,
    /// Hex public key of the admin of every deployed contract.
    pub admin_public_key: String,
    pub contracts: Vec<ContractOutcome>,
    /// Where the deployment record was written.
    pub output: PathBuf,
}

/// Orchestrates a deployment run.
pub struct Pipeline<N, C, R> {
    config: DeployConfig,
    network: N,
    compiler: C,
    runtime: R,
    cancel: CancellationToken,
}

impl<N, C, R> Pipeline<N, C, R>
where
    N: Network,
    C: ContractCompiler,
    R: ContractRuntime,
{
    pub fn new(config: DeployConfig, network: N, compiler: C, runtime: R) -> Self {
        Self {
            config,
            network,
            compiler,
            runtime,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to abort suspended stages.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the pipeline for every configured contract.
    ///
    /// The config is validated and `seeds` resolved before anything else; the seed
    /// embedded in the config is used as its config source when none is set.
    pub async fn run(&self, seeds: SeedInputs) -> Result<DeploymentReport> {
        self.config.validate()?;

        let seeds = SeedInputs {
            config: seeds.config.or_else(|| self.config.deployer_seed.clone()),
            ..seeds
        };

        let (seed, seed_source) = seeds.resolve()?;
        if seed_source == SeedSource::Quick {
            tracing::info!(
                seed = %seed.to_hex(),
                "Generated a new deployer seed, keep it to reuse this wallet"
            );
        }

        tracing::info!(stage = %Stage::Credentials, source = %seed_source, "Deriving admin keys");
        let keys = KeyPair::derive(&seed).map_err(|e| {
            DeployError::InvalidSeedFormat {
                reason: format!("{e:#}"),
            }
        })?;
        tracing::info!(
            stage = %Stage::Credentials,
            public_key = %keys.public_key_hex(),
            "✓ Admin keys derived"
        );

        let witnesses = WitnessSet::admin(&keys);
        let mut record = DeploymentRecord::new();
        let mut outcomes: Vec<ContractOutcome> = Vec::with_capacity(self.config.contracts.len());

        tracing::info!(
            network = %self.network.network_id(),
            contracts = self.config.contracts.len(),
            "Starting deployment..."
        );

        for contract in &self.config.contracts {
            match self.deploy_contract(contract, &seed, &keys, &witnesses).await {
                Ok(outcome) => {
                    record.record(&outcome.name, outcome.address.clone());
                    outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!(contract = %contract.name, error = %e, "Deployment failed");
                    if !outcomes.is_empty() {
                        tracing::warn!(
                            "{} contract(s) were deployed before the failure and are not recorded:",
                            outcomes.len()
                        );
                        for outcome in &outcomes {
                            tracing::warn!(contract = %outcome.name, address = %outcome.address, "Deployed");
                        }
                    }
                    return Err(e);
                }
            }
        }

        let output = self.config.storage.output.clone();
        tracing::info!(stage = %Stage::Persist, path = %output.display(), "Saving deployments");
        record.flush(&output)?;
        tracing::info!(stage = %Stage::Persist, path = %output.display(), "✓ Deployments saved");

        Ok(DeploymentReport {
            network: self.network.network_id(),
            seed_source,
            admin_public_key: keys.public_key_hex(),
            contracts: outcomes,
            output,
        })
    }

    async fn deploy_contract(
        &self,
        contract: &ContractConfig,
        seed: &DeployerSeed,
        keys: &KeyPair,
        witnesses: &WitnessSet,
    ) -> Result<ContractOutcome> {
        let name = contract.name.as_str();

        tracing::info!(contract = %name, stage = %Stage::Compile, "Compiling contract");
        let source = self.config.source_path(contract);
        let output = CompiledArtifact::output_dir(name, &source);
        let artifact = self.compiler.compile(name, &source, &output).await?;

        let plan = match &contract.init {
            Some(init) => {
                init::validate_signature(init, &artifact)?;
                Some(InitPlan::resolve(init, keys)?)
            }
            None => None,
        };
        tracing::info!(
            contract = %name,
            stage = %Stage::Compile,
            dir = %artifact.dir.display(),
            "✓ Contract compiled"
        );

        tracing::info!(contract = %name, stage = %Stage::OpenWallet, "Opening wallet");
        let session = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(DeployError::Cancelled),
            session = self.network.open_wallet(seed) => session.map_err(DeployError::WalletSession)?,
        };
        tracing::info!(contract = %name, stage = %Stage::OpenWallet, "✓ Wallet opened");

        let result = self
            .deploy_with_session(&session, &artifact, plan.as_ref(), witnesses)
            .await;

        let closed = session.close().await;
        match (result, closed) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(DeployError::WalletSession(
                e.context("Failed to close wallet session"),
            )),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                tracing::warn!(contract = %name, error = %close_err, "Failed to close wallet session");
                Err(e)
            }
        }
    }

    async fn deploy_with_session(
        &self,
        session: &N::Session,
        artifact: &CompiledArtifact,
        plan: Option<&InitPlan>,
        witnesses: &WitnessSet,
    ) -> Result<ContractOutcome> {
        let name = artifact.name.as_str();
        let funding = &self.config.funding;

        let state = session.state();
        let address = state.borrow().address.clone();
        tracing::info!(
            contract = %name,
            stage = %Stage::WaitForFunds,
            wallet = address.as_deref().unwrap_or("unknown"),
            threshold = %funding.min_balance,
            "Waiting for funds"
        );
        let balance = wait_for_funds(
            state,
            &funding.token,
            funding.min_balance,
            funding.timeout(),
            &self.cancel,
        )
        .await?;
        tracing::info!(
            contract = %name,
            stage = %Stage::WaitForFunds,
            balance = %balance,
            "✓ Wallet funded"
        );

        tracing::info!(contract = %name, stage = %Stage::BuildProviders, "Configuring providers");
        let bundle: ProviderBundle<'_, N> =
            ProviderBundle::build(&self.network, session, artifact, &self.config.storage)?;
        tracing::info!(contract = %name, stage = %Stage::BuildProviders, "✓ Providers configured");

        tracing::info!(contract = %name, stage = %Stage::Publish, "Deploying contract");
        let deployed: DeployedContract = self
            .cancellable(contract::publish(
                &bundle,
                &self.runtime,
                artifact,
                self.network.network_id(),
                witnesses,
            ))
            .await?;
        tracing::info!(
            contract = %name,
            stage = %Stage::Publish,
            address = %deployed.address,
            tx = %deployed.tx_id,
            block = deployed.block_height,
            "✓ Contract deployed"
        );

        let init_tx = match plan {
            Some(plan) => {
                tracing::info!(
                    contract = %name,
                    stage = %Stage::Initialize,
                    entry_point = %plan.entry_point,
                    "Initializing contract"
                );
                let tx = self
                    .cancellable(init::initialize(
                        &deployed,
                        &bundle,
                        &self.runtime,
                        plan,
                        witnesses,
                    ))
                    .await?;
                tracing::info!(
                    contract = %name,
                    stage = %Stage::Initialize,
                    tx = %tx,
                    "✓ Contract initialized"
                );
                Some(tx)
            }
            None => None,
        };

        Ok(ContractOutcome {
            name: deployed.name,
            address: deployed.address,
            deploy_tx: deployed.tx_id,
            init_tx,
        })
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DeployError::Cancelled),
            result = fut => result,
        }
    }
}
