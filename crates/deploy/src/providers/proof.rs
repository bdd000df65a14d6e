//! Proof server client.

use std::future::Future;

use anyhow::Context;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;
use url::Url;

use super::zk_config::ZkConfig;
use crate::{
    rpc::{create_proving_client, endpoint},
    tx::{LedgerTransaction, NetworkId, UnbalancedTransaction, UnprovenTransaction},
};

/// Produces proofs for contract transactions.
pub trait ProofProvider: Send + Sync {
    fn prove_tx(
        &self,
        tx: &UnprovenTransaction,
        zk_configs: &[ZkConfig],
    ) -> impl Future<Output = anyhow::Result<UnbalancedTransaction>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProveRequest {
    transaction: String,
    zk_configs: Vec<ZkConfigPayload>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ZkConfigPayload {
    circuit_id: String,
    prover_key: String,
    verifier_key: String,
    zkir: String,
}

impl From<&ZkConfig> for ZkConfigPayload {
    fn from(config: &ZkConfig) -> Self {
        Self {
            circuit_id: config.circuit_id.clone(),
            prover_key: STANDARD.encode(&config.prover_key),
            verifier_key: STANDARD.encode(&config.verifier_key),
            zkir: STANDARD.encode(&config.zkir),
        }
    }
}

/// HTTP proof server client.
#[derive(Debug, Clone)]
pub struct ProofServerClient {
    client: reqwest::Client,
    prove_url: Url,
    network: NetworkId,
}

impl ProofServerClient {
    pub fn new(url: &Url, network: NetworkId) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_proving_client()?,
            prove_url: endpoint(url, "prove-tx")?,
            network,
        })
    }
}

impl ProofProvider for ProofServerClient {
    async fn prove_tx(
        &self,
        tx: &UnprovenTransaction,
        zk_configs: &[ZkConfig],
    ) -> anyhow::Result<UnbalancedTransaction> {
        let ctx = self.network.ledger();
        let request = ProveRequest {
            transaction: STANDARD.encode(tx.serialize(ctx)),
            zk_configs: zk_configs.iter().map(ZkConfigPayload::from).collect(),
        };

        tracing::debug!(
            url = %self.prove_url,
            circuits = zk_configs.len(),
            "Requesting proof"
        );

        let body = self
            .client
            .post(self.prove_url.clone())
            .json(&request)
            .send()
            .await
            .context("Failed to send proving request")?
            .error_for_status()
            .context("Proof server rejected the transaction")?
            .bytes()
            .await
            .context("Failed to read proof server response")?;

        let proven = LedgerTransaction::deserialize(&body, ctx)
            .context("Proof server returned a malformed transaction")?;

        Ok(UnbalancedTransaction(proven))
    }
}
