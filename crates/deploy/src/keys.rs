//! Admin credential derivation.
//!
//! The seed is used as a BIP32 master seed, a child key is derived at
//! [`ADMIN_DERIVATION_PATH`] and its private scalar becomes the contract admin secret.
//! The admin public key is the Ed25519 public key of that secret.

use std::fmt;

use anyhow::Context;
use hmac::{Hmac, Mac};
use k256::{
    FieldBytes, Scalar, SecretKey,
    elliptic_curve::{Field, PrimeField, sec1::ToEncodedPoint},
};
use sha2::Sha512;

use crate::seed::DeployerSeed;

/// Derivation path of the admin key.
pub const ADMIN_DERIVATION_PATH: &str = "m/1852'/1815'/0'/0/0";

/// HMAC key used to turn a seed into a BIP32 master key.
const MASTER_KEY_SALT: &[u8] = b"Bitcoin seed";

/// Offset marking a hardened child index.
const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Contract admin key pair, shared by every contract of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: [u8; 32],
    pub public_key: [u8; 32],
}

impl KeyPair {
    /// Derive the admin key pair from a deployer seed.
    ///
    /// The derivation is a pure function of the seed.
    pub fn derive(seed: &DeployerSeed) -> anyhow::Result<Self> {
        let node = ExtendedKey::from_seed(seed.as_bytes())?.derive_path(ADMIN_DERIVATION_PATH)?;
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&node.private_key);

        Ok(Self {
            private_key: node.private_key,
            public_key: signing_key.verifying_key().to_bytes(),
        })
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

/// A secp256k1 BIP32 extended private key.
#[derive(Clone)]
struct ExtendedKey {
    private_key: [u8; 32],
    chain_code: [u8; 32],
}

impl ExtendedKey {
    fn from_seed(seed: &[u8]) -> anyhow::Result<Self> {
        let (key, chain_code) = hmac_sha512(MASTER_KEY_SALT, &[seed])?;
        parse_scalar(&key).context("Seed produced an invalid master key")?;
        Ok(Self {
            private_key: key,
            chain_code,
        })
    }

    fn derive_path(self, path: &str) -> anyhow::Result<Self> {
        let mut segments = path.split('/');
        if segments.next() != Some("m") {
            anyhow::bail!("Derivation path must start with 'm': {path}");
        }

        segments.try_fold(self, |key, segment| {
            let index = parse_index(segment)
                .with_context(|| format!("Invalid derivation path segment '{segment}'"))?;
            key.derive_child(index)
        })
    }

    fn derive_child(&self, index: u32) -> anyhow::Result<Self> {
        let index_bytes = index.to_be_bytes();
        let (tweak, chain_code) = if index >= HARDENED_OFFSET {
            hmac_sha512(&self.chain_code, &[&[0u8][..], &self.private_key[..], &index_bytes[..]])?
        } else {
            let public_key = SecretKey::from_slice(&self.private_key)
                .context("Invalid parent private key")?
                .public_key()
                .to_encoded_point(true);
            hmac_sha512(&self.chain_code, &[public_key.as_bytes(), &index_bytes[..]])?
        };

        let child = parse_scalar(&tweak)? + parse_scalar(&self.private_key)?;
        if bool::from(child.is_zero()) {
            anyhow::bail!("Derived child key {index} is zero");
        }

        let mut private_key = [0u8; 32];
        private_key.copy_from_slice(&child.to_repr());

        Ok(Self {
            private_key,
            chain_code,
        })
    }
}

fn parse_index(segment: &str) -> anyhow::Result<u32> {
    let (number, hardened) = match segment.strip_suffix('\'') {
        Some(number) => (number, true),
        None => (segment, false),
    };

    let index: u32 = number.parse()?;
    if index >= HARDENED_OFFSET {
        anyhow::bail!("Index {index} out of range");
    }

    Ok(if hardened { index + HARDENED_OFFSET } else { index })
}

fn parse_scalar(bytes: &[u8; 32]) -> anyhow::Result<Scalar> {
    Option::from(Scalar::from_repr(FieldBytes::clone_from_slice(bytes)))
        .context("Value is not a valid secp256k1 scalar")
}

fn hmac_sha512(key: &[u8], data: &[&[u8]]) -> anyhow::Result<([u8; 32], [u8; 32])> {
    let mut mac = Hmac::<Sha512>::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {e}"))?;
    for chunk in data {
        mac.update(chunk);
    }
    let output = mac.finalize().into_bytes();

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&output[..32]);
    right.copy_from_slice(&output[32..]);
    Ok((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(hex_seed: &str) -> DeployerSeed {
        DeployerSeed::from_hex(hex_seed).unwrap()
    }

    #[test]
    fn test_derive_is_deterministic() {
        let seed = seed(&"42".repeat(32));
        let first = KeyPair::derive(&seed).unwrap();
        let second = KeyPair::derive(&seed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_seeds_give_different_keys() {
        let a = KeyPair::derive(&seed(&"01".repeat(32))).unwrap();
        let b = KeyPair::derive(&seed(&"02".repeat(32))).unwrap();
        assert_ne!(a.private_key, b.private_key);
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn test_public_key_matches_private_key() {
        let keys = KeyPair::derive(&seed(&"a5".repeat(32))).unwrap();
        let expected = ed25519_dalek::SigningKey::from_bytes(&keys.private_key)
            .verifying_key()
            .to_bytes();
        assert_eq!(keys.public_key, expected);
    }

    #[test]
    fn test_bip32_vector_one() {
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let master = ExtendedKey::from_seed(&seed).unwrap();
        assert_eq!(
            hex::encode(master.private_key),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        assert_eq!(
            hex::encode(master.chain_code),
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );

        let hardened = master.clone().derive_path("m/0'").unwrap();
        assert_eq!(
            hex::encode(hardened.private_key),
            "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea"
        );

        let normal = master.derive_path("m/0'/1").unwrap();
        assert_eq!(
            hex::encode(normal.private_key),
            "3c6cb8d0f6a264c91ea8b5030fadaa8e538b020f0a387421a12de9319dc93368"
        );
    }

    #[test]
    fn test_ed25519_vector() {
        let secret: [u8; 32] =
            hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60")
                .unwrap()
                .try_into()
                .unwrap();
        let public = ed25519_dalek::SigningKey::from_bytes(&secret)
            .verifying_key()
            .to_bytes();
        assert_eq!(
            hex::encode(public),
            "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"
        );
    }

    #[test]
    fn test_invalid_paths() {
        let master = ExtendedKey::from_seed(&[7u8; 32]).unwrap();
        assert!(master.clone().derive_path("0/1").is_err());
        assert!(master.clone().derive_path("m/x").is_err());
        assert!(master.derive_path("m/2147483648").is_err());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let keys = KeyPair::derive(&seed(&"11".repeat(32))).unwrap();
        let debug = format!("{keys:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&hex::encode(keys.private_key)));
    }
}
