//! Service handles needed to publish and call contracts.

mod indexer;
mod private_state;
mod proof;
mod wallet;
mod zk_config;

use std::future::Future;

use anyhow::Context;

pub use indexer::{ApplyStage, IndexerClient, PublicDataProvider, TxData};
pub use private_state::FilePrivateStateStore;
pub use proof::{ProofProvider, ProofServerClient};
pub use wallet::WalletProvider;
pub use zk_config::{ZkConfig, ZkConfigProvider};

use crate::{
    compiler::CompiledArtifact,
    config::{FundingConfig, NetworkConfig, StorageConfig},
    error::{DeployError, Result},
    seed::DeployerSeed,
    tx::NetworkId,
    wallet::{RpcWallet, WalletOpenParams, WalletSession},
};

/// The network a run deploys to: opens wallets and hands out service clients.
pub trait Network: Send + Sync {
    type Session: WalletSession;
    type PublicData: PublicDataProvider;
    type Prover: ProofProvider;

    fn network_id(&self) -> NetworkId;

    /// Open a wallet identified by `seed`.
    fn open_wallet(
        &self,
        seed: &DeployerSeed,
    ) -> impl Future<Output = anyhow::Result<Self::Session>> + Send;

    fn public_data(&self) -> anyhow::Result<Self::PublicData>;

    fn proof_provider(&self) -> anyhow::Result<Self::Prover>;
}

/// Everything the publisher and the initializer need for one contract.
pub struct ProviderBundle<'s, N: Network> {
    pub private_state: FilePrivateStateStore,
    pub public_data: N::PublicData,
    pub zk_config: ZkConfigProvider,
    pub proof: N::Prover,
    pub wallet: WalletProvider<'s, N::Session>,
}

impl<'s, N: Network> ProviderBundle<'s, N> {
    /// Wire the providers for `artifact` around an open wallet session.
    pub fn build(
        network: &N,
        session: &'s N::Session,
        artifact: &CompiledArtifact,
        storage: &StorageConfig,
    ) -> Result<Self> {
        let private_state =
            FilePrivateStateStore::open(&storage.private_state_dir, &storage.private_state_store)
                .context("Failed to open private state store")
                .map_err(DeployError::ProviderConfig)?;
        let public_data = network.public_data().map_err(DeployError::ProviderConfig)?;
        let proof = network.proof_provider().map_err(DeployError::ProviderConfig)?;
        let wallet =
            WalletProvider::new(session, network.network_id()).map_err(DeployError::ProviderConfig)?;

        tracing::debug!(
            contract = %artifact.name,
            store = %private_state.dir().display(),
            coin_public_key = %wallet.coin_public_key(),
            "Providers configured"
        );

        Ok(Self {
            private_state,
            public_data,
            zk_config: ZkConfigProvider::new(&artifact.dir),
            proof,
            wallet,
        })
    }
}

/// A network reached through a wallet daemon, an indexer and a proof server.
#[derive(Debug, Clone)]
pub struct RemoteNetwork {
    config: NetworkConfig,
    funding: FundingConfig,
}

impl RemoteNetwork {
    pub fn new(config: NetworkConfig, funding: FundingConfig) -> Self {
        Self { config, funding }
    }
}

impl Network for RemoteNetwork {
    type Session = RpcWallet;
    type PublicData = IndexerClient;
    type Prover = ProofServerClient;

    fn network_id(&self) -> NetworkId {
        self.config.id
    }

    async fn open_wallet(&self, seed: &DeployerSeed) -> anyhow::Result<RpcWallet> {
        let params = WalletOpenParams {
            seed: seed.wallet_seed_hex(),
            indexer_url: self.config.indexer_url.clone(),
            indexer_ws_url: self.config.indexer_ws_url.clone(),
            proof_server_url: self.config.proof_server_url.clone(),
            node_url: self.config.node_url.clone(),
            network_id: self.config.id,
        };

        RpcWallet::open(
            self.config.wallet_rpc_url.clone(),
            params,
            self.funding.poll_interval(),
        )
        .await
    }

    fn public_data(&self) -> anyhow::Result<IndexerClient> {
        IndexerClient::new(self.config.indexer_url.clone())
    }

    fn proof_provider(&self) -> anyhow::Result<ProofServerClient> {
        ProofServerClient::new(&self.config.proof_server_url, self.config.id)
    }
}
