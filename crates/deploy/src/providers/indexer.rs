//! Public data provider backed by the indexer GraphQL API.

use std::{future::Future, time::Duration};

use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::{
    rpc::{create_client, graphql_query},
    tx::{ContractAddress, TransactionId},
};

/// Delay between two indexer lookups of a pending transaction.
const TX_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Lookups before giving up on a submitted transaction.
const TX_POLL_ATTEMPTS: usize = 300;

const TX_QUERY: &str = r#"
query TxData($identifier: HexEncoded!) {
  transactions(offset: { identifier: $identifier }) {
    hash
    applyStage
    block { height hash }
  }
}"#;

const CONTRACT_STATE_QUERY: &str = r#"
query ContractState($address: HexEncoded!) {
  contractAction(address: $address) {
    state
  }
}"#;

/// Outcome of applying a transaction to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
pub enum ApplyStage {
    SucceedEntirely,
    SucceedPartially,
    FailEntirely,
    #[serde(other)]
    Unknown,
}

impl ApplyStage {
    /// Only a fully applied transaction counts, partial application is a failure.
    pub fn is_success(self) -> bool {
        matches!(self, Self::SucceedEntirely)
    }
}

/// An observed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxData {
    pub tx_id: TransactionId,
    pub tx_hash: String,
    pub block_height: u64,
    pub block_hash: String,
    pub status: ApplyStage,
}

/// Queryable view of on-chain public data.
pub trait PublicDataProvider: Send + Sync {
    /// Wait until `tx_id` is included in a block.
    fn watch_for_tx_data(
        &self,
        tx_id: &TransactionId,
    ) -> impl Future<Output = anyhow::Result<TxData>> + Send;

    /// Current serialized state of a contract, `None` if the contract is unknown.
    fn query_contract_state(
        &self,
        address: &ContractAddress,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionsData {
    transactions: Vec<TransactionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionEntry {
    hash: String,
    apply_stage: ApplyStage,
    block: BlockEntry,
}

#[derive(Debug, Deserialize)]
struct BlockEntry {
    height: u64,
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractStateData {
    contract_action: Option<ContractActionEntry>,
}

#[derive(Debug, Deserialize)]
struct ContractActionEntry {
    state: String,
}

/// Indexer client.
#[derive(Debug, Clone)]
pub struct IndexerClient {
    client: reqwest::Client,
    url: Url,
    poll_interval: Duration,
    poll_attempts: usize,
}

impl IndexerClient {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
            poll_interval: TX_POLL_INTERVAL,
            poll_attempts: TX_POLL_ATTEMPTS,
        })
    }

    pub fn with_polling(mut self, interval: Duration, attempts: usize) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    async fn find_tx(&self, tx_id: &TransactionId) -> anyhow::Result<TxData> {
        let data: TransactionsData = graphql_query(
            &self.client,
            &self.url,
            TX_QUERY,
            json!({ "identifier": tx_id.0 }),
        )
        .await?;

        let entry = data
            .transactions
            .into_iter()
            .next()
            .with_context(|| format!("Transaction {} not indexed yet", tx_id))?;

        Ok(TxData {
            tx_id: tx_id.clone(),
            tx_hash: entry.hash,
            block_height: entry.block.height,
            block_hash: entry.block.hash,
            status: entry.apply_stage,
        })
    }
}

impl PublicDataProvider for IndexerClient {
    async fn watch_for_tx_data(&self, tx_id: &TransactionId) -> anyhow::Result<TxData> {
        let backoff = ConstantBuilder::default()
            .with_delay(self.poll_interval)
            .with_max_times(self.poll_attempts);

        let data = (|| self.find_tx(tx_id))
            .retry(backoff)
            .notify(|err, after| {
                tracing::trace!(tx = %tx_id, error = %err, ?after, "Transaction not observed, retrying...");
            })
            .await
            .with_context(|| format!("Transaction {} was never observed by the indexer", tx_id))?;

        tracing::debug!(
            tx = %tx_id,
            block = data.block_height,
            status = %data.status,
            "Transaction observed"
        );

        Ok(data)
    }

    async fn query_contract_state(
        &self,
        address: &ContractAddress,
    ) -> anyhow::Result<Option<String>> {
        let data: ContractStateData = graphql_query(
            &self.client,
            &self.url,
            CONTRACT_STATE_QUERY,
            json!({ "address": address.0 }),
        )
        .await
        .with_context(|| format!("Failed to query state of contract {}", address))?;

        Ok(data.contract_action.map(|action| action.state))
    }
}
