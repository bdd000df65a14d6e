//! Deployer seed parsing and resolution.
//!
//! The seed is the root secret of a run: the wallet identity and the contract admin key
//! are both derived from it. It can come from four places, checked in this order:
//!
//! 1. an explicit `--seed` flag,
//! 2. quick mode, which generates a fresh random seed,
//! 3. `deployer_seed` in the config file,
//! 4. the `DEPLOYER_HEX_SEED` environment variable.

use std::fmt;

use rand::Rng;

use crate::error::{DeployError, Result};

/// Environment variable holding the deployer seed.
pub const SEED_ENV_VAR: &str = "DEPLOYER_HEX_SEED";

/// Environment variable holding a deployer mnemonic (only read by wallet tooling).
pub const MNEMONIC_ENV_VAR: &str = "DEPLOYER_MNEMONIC";

/// Length of a seed in bytes.
pub const SEED_LEN: usize = 32;

/// A validated 32-byte deployer seed.
#[derive(Clone, PartialEq, Eq)]
pub struct DeployerSeed([u8; SEED_LEN]);

impl DeployerSeed {
    /// Parse a seed from exactly 64 hexadecimal characters.
    pub fn from_hex(seed_hex: &str) -> Result<Self> {
        if seed_hex.len() != SEED_LEN * 2 {
            return Err(DeployError::InvalidSeedFormat {
                reason: format!("expected {} characters, got {}", SEED_LEN * 2, seed_hex.len()),
            });
        }

        if let Some(c) = seed_hex.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(DeployError::InvalidSeedFormat {
                reason: format!("non-hex character {c:?}"),
            });
        }

        let mut bytes = [0u8; SEED_LEN];
        hex::decode_to_slice(seed_hex, &mut bytes).map_err(|e| DeployError::InvalidSeedFormat {
            reason: e.to_string(),
        })?;

        Ok(Self(bytes))
    }

    /// Generate a new random seed.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self(rng.random())
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    /// Lowercase hex encoding of the seed.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The wallet identity material: the first 32 bytes of the seed.
    ///
    /// This is the same material the admin key is derived from.
    pub fn wallet_seed_hex(&self) -> String {
        hex::encode(&self.0[..32])
    }
}

impl fmt::Debug for DeployerSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeployerSeed(<redacted>)")
    }
}

/// Where the effective seed was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SeedSource {
    Cli,
    Quick,
    Config,
    Env,
}

/// Candidate seed sources for a run.
#[derive(Debug, Clone, Default)]
pub struct SeedInputs {
    /// Seed passed with `--seed`.
    pub cli: Option<String>,
    /// Whether `--quick-deploy` was requested.
    pub quick: bool,
    /// `deployer_seed` from the config file.
    pub config: Option<String>,
    /// Value of [`SEED_ENV_VAR`].
    pub env: Option<String>,
}

impl SeedInputs {
    /// Pick the first populated source and validate it.
    ///
    /// Empty or blank strings count as not populated.
    pub fn resolve(&self) -> Result<(DeployerSeed, SeedSource)> {
        fn populated(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.trim().is_empty())
        }

        if let Some(seed) = populated(&self.cli) {
            return Ok((DeployerSeed::from_hex(seed)?, SeedSource::Cli));
        }

        if self.quick {
            return Ok((DeployerSeed::random(), SeedSource::Quick));
        }

        if let Some(seed) = populated(&self.config) {
            return Ok((DeployerSeed::from_hex(seed)?, SeedSource::Config));
        }

        if let Some(seed) = populated(&self.env) {
            return Ok((DeployerSeed::from_hex(seed)?, SeedSource::Env));
        }

        Err(DeployError::MissingSeed)
    }
}
