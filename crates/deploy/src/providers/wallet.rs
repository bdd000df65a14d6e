//! Transaction provider backed by a wallet session.

use anyhow::Context;

use crate::{
    tx::{
        BalancedTransaction, NetworkId, TransactionId, UnbalancedTransaction, ledger_to_zswap,
        zswap_to_ledger,
    },
    wallet::WalletSession,
};

/// Balances and submits transactions through a wallet session.
pub struct WalletProvider<'s, S> {
    session: &'s S,
    network: NetworkId,
    coin_public_key: String,
}

impl<'s, S: WalletSession> WalletProvider<'s, S> {
    /// Fails when the wallet has not published its public keys yet.
    pub fn new(session: &'s S, network: NetworkId) -> anyhow::Result<Self> {
        let state = session.state().borrow().clone();

        let coin_public_key = state
            .coin_public_key
            .filter(|k| !k.is_empty())
            .context("Wallet state has no coin public key")?;
        if state.encryption_public_key.as_deref().is_none_or(str::is_empty) {
            anyhow::bail!("Wallet state has no encryption public key");
        }

        Ok(Self {
            session,
            network,
            coin_public_key,
        })
    }

    pub fn coin_public_key(&self) -> &str {
        &self.coin_public_key
    }

    /// Balance and prove a transaction.
    ///
    /// The ledger transaction is re-encoded for the zswap layer, balanced and proven by
    /// the wallet, then re-encoded for the ledger.
    pub async fn balance_tx(
        &self,
        tx: UnbalancedTransaction,
        new_coins: Vec<String>,
    ) -> anyhow::Result<BalancedTransaction> {
        let ledger = self.network.ledger();
        let zswap = self.network.zswap();

        let zswap_tx =
            ledger_to_zswap(&tx, ledger, zswap).context("Failed to re-encode transaction for the wallet")?;
        let balanced = self
            .session
            .balance_transaction(zswap_tx, new_coins)
            .await
            .context("Failed to balance transaction")?;
        let proven = self
            .session
            .prove_transaction(balanced)
            .await
            .context("Failed to prove balanced transaction")?;
        let ledger_tx = zswap_to_ledger(&proven, zswap, ledger)
            .context("Failed to re-encode transaction for the ledger")?;

        Ok(BalancedTransaction(ledger_tx))
    }

    pub async fn submit_tx(&self, tx: &BalancedTransaction) -> anyhow::Result<TransactionId> {
        self.session
            .submit_transaction(tx)
            .await
            .context("Failed to submit transaction")
    }
}
