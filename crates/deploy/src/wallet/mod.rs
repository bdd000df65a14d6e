//! Wallet sessions.
//!
//! A session is a network-attached wallet identified by the deployer seed. Its state is
//! observed through a [`watch`] channel, which the funding wait suspends on.

mod rpc;

use std::{collections::BTreeMap, fmt, future::Future, time::Duration};

use serde::{Deserialize, Deserializer, de};
use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;

pub use rpc::{RpcWallet, WalletOpenParams};

use crate::{
    error::{DeployError, Result},
    tx::{BalancedTransaction, TransactionId, ZswapTransaction},
};

/// Snapshot of a wallet as reported by the wallet service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    /// Balances by token identifier, in minimal units.
    #[serde(default, deserialize_with = "deserialize_balances")]
    pub balances: BTreeMap<String, u128>,
    #[serde(default)]
    pub coin_public_key: Option<String>,
    #[serde(default)]
    pub encryption_public_key: Option<String>,
    /// Wallet address, used for funding instructions.
    #[serde(default)]
    pub address: Option<String>,
}

impl WalletState {
    /// Balance of `token`, zero when the wallet never held it.
    pub fn native_balance(&self, token: &str) -> u128 {
        self.balances.get(token).copied().unwrap_or_default()
    }
}

/// A balance sent either as a JSON integer or as a decimal string.
///
/// JSON numbers above `u64::MAX` lose precision in transit and are rejected.
struct Amount(u128);

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Amount, E> {
                Ok(Amount(u128::from(v)))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<Amount, E> {
                Ok(Amount(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Amount, E> {
                u128::try_from(v)
                    .map(Amount)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Amount, E> {
                Err(E::custom(format!(
                    "amount {v} is not an exact integer, large amounts must be decimal strings"
                )))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Amount, E> {
                v.parse()
                    .map(Amount)
                    .map_err(|e| E::custom(format!("invalid amount {v:?}: {e}")))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

fn deserialize_balances<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, u128>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Amount>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(token, amount)| (token, amount.0)).collect())
}

/// An open wallet.
///
/// Sessions are owned by a single contract iteration and must be closed before the next
/// one starts.
pub trait WalletSession: Send + Sync {
    /// Receiver of the wallet state, updated as the wallet syncs.
    fn state(&self) -> watch::Receiver<WalletState>;

    /// Add inputs and outputs so that `tx` covers its fees.
    fn balance_transaction(
        &self,
        tx: ZswapTransaction,
        new_coins: Vec<String>,
    ) -> impl Future<Output = anyhow::Result<ZswapTransaction>> + Send;

    /// Prove the wallet-owned parts of a balanced transaction.
    fn prove_transaction(
        &self,
        tx: ZswapTransaction,
    ) -> impl Future<Output = anyhow::Result<ZswapTransaction>> + Send;

    /// Submit a transaction to the ledger.
    fn submit_transaction(
        &self,
        tx: &BalancedTransaction,
    ) -> impl Future<Output = anyhow::Result<TransactionId>> + Send;

    /// Release the session. Calling `close` more than once is a no-op.
    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Suspend until the `token` balance observed on `state` is strictly greater than
/// `threshold`, and return that balance.
pub async fn wait_for_funds(
    mut state: watch::Receiver<WalletState>,
    token: &str,
    threshold: u128,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<u128> {
    let started = Instant::now();

    let outcome = tokio::select! {
        biased;

        _ = cancel.cancelled() => return Err(DeployError::Cancelled),

        result = tokio::time::timeout(timeout, state.wait_for(|s| {
            let balance = s.native_balance(token);
            tracing::debug!(balance, threshold, "Observed wallet balance");
            balance > threshold
        })) => result.map(|r| r.map(|s| s.native_balance(token))),
    };

    match outcome {
        Ok(Ok(balance)) => Ok(balance),
        Ok(Err(_)) => Err(DeployError::WalletSession(anyhow::anyhow!(
            "Wallet state channel closed while waiting for funds"
        ))),
        Err(_) => Err(DeployError::FundingTimeout {
            threshold,
            observed: state.borrow().native_balance(token),
            waited: started.elapsed(),
        }),
    }
}
