//! Contract publication and circuit calls.

use std::path::PathBuf;

use anyhow::Context;
use serde_json::json;

use crate::{
    compiler::CompiledArtifact,
    error::{DeployError, Result},
    providers::{Network, ProofProvider, ProviderBundle, PublicDataProvider, TxData},
    runtime::{ArgumentValue, CallRequest, ContractRuntime, DeployRequest, WitnessSet},
    tx::{ContractAddress, LedgerTransaction, NetworkId, TransactionId, UnprovenTransaction},
};

/// Id under which the private state of `contract` is stored.
pub fn private_state_id(contract: &str) -> String {
    format!("{contract}-private")
}

/// A contract instance live on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub name: String,
    pub address: ContractAddress,
    /// Deployment transaction.
    pub tx_id: TransactionId,
    pub block_height: u64,
    module: PathBuf,
    network: NetworkId,
}

/// Publish a compiled contract with an empty initial private state.
pub async fn publish<N, R>(
    bundle: &ProviderBundle<'_, N>,
    runtime: &R,
    artifact: &CompiledArtifact,
    network: NetworkId,
    witnesses: &WitnessSet,
) -> Result<DeployedContract>
where
    N: Network,
    R: ContractRuntime,
{
    let request = DeployRequest {
        module: artifact.module_path(),
        network_id: network,
        coin_public_key: bundle.wallet.coin_public_key().to_string(),
        initial_private_state: json!({}),
        witnesses: witnesses.clone(),
    };

    let deployed = async {
        let missing = artifact
            .info
            .witnesses
            .iter()
            .find(|w| !witnesses.contains(&w.name));
        if let Some(witness) = missing {
            anyhow::bail!("Contract expects witness '{}' which is not provided", witness.name);
        }

        let output = runtime
            .deploy(&request)
            .await
            .context("Contract runtime failed to build the deploy transaction")?;

        tracing::debug!(
            contract = %artifact.name,
            address = %output.contract_address,
            circuits = ?output.circuits,
            "Deploy transaction built"
        );

        // Nothing local may fail once the contract is on-chain.
        let state_id = private_state_id(&artifact.name);
        bundle
            .private_state
            .set(&state_id, &output.private_state)
            .context("Failed to store private state")?;
        bundle
            .private_state
            .set_signing_key(&output.contract_address, &output.signing_key)
            .context("Failed to store signing key")?;

        let data = submit_contract_tx(bundle, network, &output.transaction, &output.circuits).await?;

        anyhow::Ok(DeployedContract {
            name: artifact.name.clone(),
            address: output.contract_address,
            tx_id: data.tx_id,
            block_height: data.block_height,
            module: artifact.module_path(),
            network,
        })
    }
    .await;

    deployed.map_err(|e| DeployError::publication(&artifact.name, e))
}

impl DeployedContract {
    /// Call `circuit` with positional `args` and wait for the call to be applied.
    pub async fn call<N, R>(
        &self,
        bundle: &ProviderBundle<'_, N>,
        runtime: &R,
        circuit: &str,
        args: Vec<ArgumentValue>,
        witnesses: &WitnessSet,
    ) -> anyhow::Result<TxData>
    where
        N: Network,
        R: ContractRuntime,
    {
        let contract_state = bundle
            .public_data
            .query_contract_state(&self.address)
            .await?
            .with_context(|| format!("Contract {} is not known to the indexer", self.address))?;

        let state_id = private_state_id(&self.name);
        let private_state = bundle
            .private_state
            .get(&state_id)?
            .unwrap_or_else(|| json!({}));

        let request = CallRequest {
            module: self.module.clone(),
            network_id: self.network,
            coin_public_key: bundle.wallet.coin_public_key().to_string(),
            contract_address: self.address.clone(),
            contract_state,
            private_state,
            circuit: circuit.to_string(),
            args,
            witnesses: witnesses.clone(),
        };

        let output = runtime
            .call(&request)
            .await
            .with_context(|| format!("Contract runtime failed to build the '{circuit}' call"))?;

        let data = submit_contract_tx(bundle, self.network, &output.transaction, &output.circuits).await?;

        bundle
            .private_state
            .set(&state_id, &output.private_state)
            .context("Failed to store private state")?;

        Ok(data)
    }
}

/// Prove, balance and submit an unproven contract transaction, then wait until the
/// indexer reports it applied.
async fn submit_contract_tx<N: Network>(
    bundle: &ProviderBundle<'_, N>,
    network: NetworkId,
    tx_hex: &str,
    circuits: &[String],
) -> anyhow::Result<TxData> {
    let unproven = UnprovenTransaction(
        LedgerTransaction::from_hex(tx_hex, network.ledger())
            .context("Contract runtime returned a malformed transaction")?,
    );

    let zk_configs = bundle.zk_config.get_many(circuits)?;
    let proven = bundle
        .proof
        .prove_tx(&unproven, &zk_configs)
        .await
        .context("Failed to prove transaction")?;
    let balanced = bundle.wallet.balance_tx(proven, Vec::new()).await?;
    let tx_id = bundle.wallet.submit_tx(&balanced).await?;

    tracing::debug!(tx = %tx_id, "Transaction submitted");

    let data = bundle.public_data.watch_for_tx_data(&tx_id).await?;
    if !data.status.is_success() {
        anyhow::bail!(
            "Transaction {} failed to apply ({}) in block {}",
            tx_id,
            data.status,
            data.block_height
        );
    }

    Ok(data)
}
