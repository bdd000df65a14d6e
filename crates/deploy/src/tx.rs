//! Network identifiers and the transaction wire codec.
//!
//! Transactions travel between two subsystems that name networks in separate namespaces:
//! the ledger (contract runtime, submission) and zswap (wallet balancing and proving).
//! A transaction is a canonical frame:
//!
//! ```text
//! magic "MNTX" | version u8 | network tag u8 | body length u32 LE | body
//! ```
//!
//! and each layer only accepts frames tagged with its own network. Crossing layers is
//! always `serialize` under one context followed by `deserialize` under the other.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Frame magic.
pub const FRAME_MAGIC: &[u8; 4] = b"MNTX";
/// Current frame format version.
pub const FRAME_VERSION: u8 = 1;
const HEADER_LEN: usize = FRAME_MAGIC.len() + 1 + 1 + 4;

/// Network a deployment targets.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NetworkId {
    Undeployed,
    DevNet,
    #[default]
    TestNet,
    MainNet,
}

impl NetworkId {
    /// The wire tag of this network.
    pub fn tag(self) -> u8 {
        match self {
            Self::Undeployed => 0,
            Self::DevNet => 1,
            Self::TestNet => 2,
            Self::MainNet => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Undeployed),
            1 => Some(Self::DevNet),
            2 => Some(Self::TestNet),
            3 => Some(Self::MainNet),
            _ => None,
        }
    }

    /// Serialization context of the ledger layer for this network.
    pub fn ledger(self) -> LedgerContext {
        SerializationContext::new(self)
    }

    /// Serialization context of the zswap layer for this network.
    pub fn zswap(self) -> ZswapContext {
        SerializationContext::new(self)
    }
}

/// A transaction namespace.
pub trait Layer: Copy + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Ledger layer marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ledger {}

/// Zswap layer marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zswap {}

impl Layer for Ledger {
    const NAME: &'static str = "ledger";
}

impl Layer for Zswap {
    const NAME: &'static str = "zswap";
}

/// Network context used to encode and decode transactions of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializationContext<L: Layer> {
    network_id: NetworkId,
    _layer: PhantomData<L>,
}

pub type LedgerContext = SerializationContext<Ledger>;
pub type ZswapContext = SerializationContext<Zswap>;

impl<L: Layer> SerializationContext<L> {
    pub fn new(network_id: NetworkId) -> Self {
        Self {
            network_id,
            _layer: PhantomData,
        }
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }
}

/// Errors raised while decoding a transaction frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("frame is truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("frame does not start with the transaction magic")]
    BadMagic,
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown network tag {0}")]
    UnknownNetwork(u8),
    #[error("{layer} context expects network {expected}, frame is tagged {found}")]
    NetworkMismatch {
        layer: &'static str,
        expected: NetworkId,
        found: NetworkId,
    },
    #[error("{0} trailing bytes after frame body")]
    TrailingBytes(usize),
    #[error("invalid hex: {0}")]
    Hex(String),
}

/// An opaque transaction belonging to layer `L`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction<L: Layer> {
    body: Vec<u8>,
    _layer: PhantomData<L>,
}

pub type LedgerTransaction = Transaction<Ledger>;
pub type ZswapTransaction = Transaction<Zswap>;

impl<L: Layer> Transaction<L> {
    pub fn from_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            _layer: PhantomData,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Encode the transaction as a frame tagged with the context's network.
    pub fn serialize(&self, ctx: SerializationContext<L>) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_LEN + self.body.len());
        frame.extend_from_slice(FRAME_MAGIC);
        frame.push(FRAME_VERSION);
        frame.push(ctx.network_id().tag());
        frame.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&self.body);
        frame
    }

    /// Decode a frame, rejecting frames tagged for another network.
    pub fn deserialize(bytes: &[u8], ctx: SerializationContext<L>) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                got: bytes.len(),
            });
        }

        let (header, rest) = bytes.split_at(HEADER_LEN);
        if &header[..4] != FRAME_MAGIC {
            return Err(CodecError::BadMagic);
        }
        if header[4] != FRAME_VERSION {
            return Err(CodecError::UnsupportedVersion(header[4]));
        }

        let found = NetworkId::from_tag(header[5]).ok_or(CodecError::UnknownNetwork(header[5]))?;
        if found != ctx.network_id() {
            return Err(CodecError::NetworkMismatch {
                layer: L::NAME,
                expected: ctx.network_id(),
                found,
            });
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[6..10]);
        let body_len = u32::from_le_bytes(len_bytes) as usize;

        if rest.len() < body_len {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN + body_len,
                got: bytes.len(),
            });
        }
        if rest.len() > body_len {
            return Err(CodecError::TrailingBytes(rest.len() - body_len));
        }

        Ok(Self::from_body(rest))
    }

    pub fn to_hex(&self, ctx: SerializationContext<L>) -> String {
        hex::encode(self.serialize(ctx))
    }

    pub fn from_hex(frame_hex: &str, ctx: SerializationContext<L>) -> Result<Self, CodecError> {
        let bytes = hex::decode(frame_hex.trim_start_matches("0x"))
            .map_err(|e| CodecError::Hex(e.to_string()))?;
        Self::deserialize(&bytes, ctx)
    }
}

/// Re-encode a ledger transaction for the zswap layer.
pub fn ledger_to_zswap(
    tx: &LedgerTransaction,
    ledger: LedgerContext,
    zswap: ZswapContext,
) -> Result<ZswapTransaction, CodecError> {
    ZswapTransaction::deserialize(&tx.serialize(ledger), zswap)
}

/// Re-encode a zswap transaction for the ledger layer.
pub fn zswap_to_ledger(
    tx: &ZswapTransaction,
    zswap: ZswapContext,
    ledger: LedgerContext,
) -> Result<LedgerTransaction, CodecError> {
    LedgerTransaction::deserialize(&tx.serialize(zswap), ledger)
}

/// A contract transaction produced by the runtime, before proving.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Deref)]
pub struct UnprovenTransaction(pub LedgerTransaction);

/// A proven transaction that still needs fees balanced by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Deref)]
pub struct UnbalancedTransaction(pub LedgerTransaction);

/// A balanced, proven transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Deref)]
pub struct BalancedTransaction(pub LedgerTransaction);

/// Identifier assigned to a submitted transaction.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct TransactionId(pub String);

/// On-chain address of a deployed contract.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct ContractAddress(pub String);
