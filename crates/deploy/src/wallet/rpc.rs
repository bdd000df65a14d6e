//! Wallet session backed by a wallet daemon speaking JSON-RPC.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{WalletSession, WalletState};
use crate::{
    rpc::{create_client, json_rpc_call},
    tx::{BalancedTransaction, NetworkId, TransactionId, ZswapTransaction},
};

/// Parameters of `wallet_open`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletOpenParams {
    /// Wallet identity material, hex encoded.
    pub seed: String,
    pub indexer_url: Url,
    pub indexer_ws_url: Url,
    pub proof_server_url: Url,
    pub node_url: Url,
    pub network_id: NetworkId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenResult {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct TransactionResult {
    transaction: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResult {
    tx_id: String,
}

/// A wallet session opened on a wallet daemon.
///
/// The wallet state is refreshed by a background task until the session is closed or
/// dropped.
pub struct RpcWallet {
    client: reqwest::Client,
    url: Url,
    session_id: String,
    network: NetworkId,
    state: watch::Receiver<WalletState>,
    poller: JoinHandle<()>,
    stop: CancellationToken,
    closed: AtomicBool,
}

impl RpcWallet {
    /// Open a session and start polling its state every `poll_interval`.
    pub async fn open(
        url: Url,
        params: WalletOpenParams,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let client = create_client()?;
        let network = params.network_id;

        let opened: OpenResult = json_rpc_call(&client, &url, "wallet_open", &params)
            .await
            .context("Failed to open wallet")?;

        tracing::debug!(session = %opened.session_id, network = %network, "Wallet session opened");

        let initial: anyhow::Result<WalletState> = json_rpc_call(
            &client,
            &url,
            "wallet_state",
            json!({ "sessionId": opened.session_id }),
        )
        .await;

        let initial = match initial {
            Ok(state) => state,
            Err(e) => {
                if let Err(close_err) = close_session(&client, &url, &opened.session_id).await {
                    tracing::warn!(
                        session = %opened.session_id,
                        error = %close_err,
                        "Failed to close wallet session"
                    );
                }
                return Err(e.context("Failed to fetch initial wallet state"));
            }
        };

        let (tx, state) = watch::channel(initial);
        let stop = CancellationToken::new();

        let poller = tokio::spawn(poll_state(
            client.clone(),
            url.clone(),
            opened.session_id.clone(),
            poll_interval,
            tx,
            stop.clone(),
        ));

        Ok(Self {
            client,
            url,
            session_id: opened.session_id,
            network,
            state,
            poller,
            stop,
            closed: AtomicBool::new(false),
        })
    }
}

async fn close_session(client: &reqwest::Client, url: &Url, session_id: &str) -> anyhow::Result<()> {
    json_rpc_call::<serde_json::Value>(
        client,
        url,
        "wallet_close",
        json!({ "sessionId": session_id }),
    )
    .await
    .context("Failed to close wallet session")?;

    tracing::debug!(session = %session_id, "Wallet session closed");
    Ok(())
}

async fn poll_state(
    client: reqwest::Client,
    url: Url,
    session_id: String,
    interval: Duration,
    tx: watch::Sender<WalletState>,
    stop: CancellationToken,
) {
    let mut failing = false;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let result: anyhow::Result<WalletState> = json_rpc_call(
            &client,
            &url,
            "wallet_state",
            json!({ "sessionId": session_id }),
        )
        .await;

        match result {
            Ok(state) => {
                failing = false;
                tx.send_if_modified(|current| {
                    if *current == state {
                        return false;
                    }
                    *current = state;
                    true
                });
            }
            // Warn once per streak of failures.
            Err(e) if !failing => {
                failing = true;
                tracing::warn!(error = %format!("{e:#}"), session = %session_id, "Wallet state refresh failed, retrying...");
            }
            Err(e) => {
                tracing::debug!(error = %format!("{e:#}"), session = %session_id, "Wallet state refresh failed, retrying...");
            }
        }
    }

    tracing::trace!(session = %session_id, "Wallet state poller stopped");
}

impl WalletSession for RpcWallet {
    fn state(&self) -> watch::Receiver<WalletState> {
        self.state.clone()
    }

    async fn balance_transaction(
        &self,
        tx: ZswapTransaction,
        new_coins: Vec<String>,
    ) -> anyhow::Result<ZswapTransaction> {
        let result: TransactionResult = json_rpc_call(
            &self.client,
            &self.url,
            "wallet_balanceTransaction",
            json!({
                "sessionId": self.session_id,
                "transaction": tx.to_hex(self.network.zswap()),
                "newCoins": new_coins,
            }),
        )
        .await?;

        ZswapTransaction::from_hex(&result.transaction, self.network.zswap())
            .context("Wallet returned a malformed balanced transaction")
    }

    async fn prove_transaction(&self, tx: ZswapTransaction) -> anyhow::Result<ZswapTransaction> {
        let result: TransactionResult = json_rpc_call(
            &self.client,
            &self.url,
            "wallet_proveTransaction",
            json!({
                "sessionId": self.session_id,
                "transaction": tx.to_hex(self.network.zswap()),
            }),
        )
        .await?;

        ZswapTransaction::from_hex(&result.transaction, self.network.zswap())
            .context("Wallet returned a malformed proven transaction")
    }

    async fn submit_transaction(&self, tx: &BalancedTransaction) -> anyhow::Result<TransactionId> {
        let result: SubmitResult = json_rpc_call(
            &self.client,
            &self.url,
            "wallet_submitTransaction",
            json!({
                "sessionId": self.session_id,
                "transaction": tx.to_hex(self.network.ledger()),
            }),
        )
        .await?;

        Ok(TransactionId::from(result.tx_id))
    }

    async fn close(&self) -> anyhow::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.stop.cancel();
        close_session(&self.client, &self.url, &self.session_id).await
    }
}

impl Drop for RpcWallet {
    fn drop(&mut self) {
        self.stop.cancel();
        self.poller.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockBuilder, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method},
    };

    const POLL_INTERVAL: Duration = Duration::from_secs(3600);

    fn params() -> WalletOpenParams {
        let url = Url::parse("http://localhost:1").unwrap();
        WalletOpenParams {
            seed: "00".repeat(32),
            indexer_url: url.clone(),
            indexer_ws_url: url.clone(),
            proof_server_url: url.clone(),
            node_url: url,
            network_id: NetworkId::Undeployed,
        }
    }

    fn rpc(rpc_method: &str) -> MockBuilder {
        Mock::given(method("POST")).and(body_partial_json(json!({ "method": rpc_method })))
    }

    fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
    }

    fn rpc_error(message: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": message }
        }))
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let server = MockServer::start().await;
        rpc("wallet_open")
            .respond_with(rpc_result(json!({ "sessionId": "s-1" })))
            .expect(1)
            .mount(&server)
            .await;
        rpc("wallet_state")
            .respond_with(rpc_result(json!({
                "balances": { "02": "5000000" },
                "coinPublicKey": "c0ffee",
                "encryptionPublicKey": "e4c"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "wallet_close", "params": { "sessionId": "s-1" } })))
            .respond_with(rpc_result(serde_json::Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let wallet = RpcWallet::open(url, params(), POLL_INTERVAL).await.unwrap();
        assert_eq!(wallet.state().borrow().native_balance("02"), 5_000_000);

        wallet.close().await.unwrap();
        wallet.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_closes_session_when_state_fails() {
        let server = MockServer::start().await;
        rpc("wallet_open")
            .respond_with(rpc_result(json!({ "sessionId": "s-1" })))
            .expect(1)
            .mount(&server)
            .await;
        rpc("wallet_state")
            .respond_with(rpc_error("wallet is not synced"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "wallet_close", "params": { "sessionId": "s-1" } })))
            .respond_with(rpc_result(serde_json::Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let Err(err) = RpcWallet::open(url, params(), POLL_INTERVAL).await else {
            panic!("wallet opened without a state");
        };
        assert!(format!("{err:#}").contains("wallet is not synced"), "{err:#}");
    }
}
