//! Zero-knowledge material of a compiled contract.

use std::path::{Path, PathBuf};

use anyhow::Context;

const KEYS_DIR: &str = "keys";
const ZKIR_DIR: &str = "zkir";

/// Prover key, verifier key and intermediate representation of one circuit.
#[derive(Clone, PartialEq, Eq)]
pub struct ZkConfig {
    pub circuit_id: String,
    pub prover_key: Vec<u8>,
    pub verifier_key: Vec<u8>,
    pub zkir: Vec<u8>,
}

impl std::fmt::Debug for ZkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZkConfig")
            .field("circuit_id", &self.circuit_id)
            .field("prover_key", &format_args!("{} bytes", self.prover_key.len()))
            .field("verifier_key", &format_args!("{} bytes", self.verifier_key.len()))
            .field("zkir", &format_args!("{} bytes", self.zkir.len()))
            .finish()
    }
}

/// Loads ZK material from an artifact directory.
#[derive(Debug, Clone)]
pub struct ZkConfigProvider {
    dir: PathBuf,
}

impl ZkConfigProvider {
    pub fn new(artifact_dir: &Path) -> Self {
        Self {
            dir: artifact_dir.to_path_buf(),
        }
    }

    pub fn prover_key_path(&self, circuit: &str) -> PathBuf {
        self.dir.join(KEYS_DIR).join(format!("{circuit}.prover"))
    }

    pub fn verifier_key_path(&self, circuit: &str) -> PathBuf {
        self.dir.join(KEYS_DIR).join(format!("{circuit}.verifier"))
    }

    pub fn zkir_path(&self, circuit: &str) -> PathBuf {
        self.dir.join(ZKIR_DIR).join(format!("{circuit}.bzkir"))
    }

    pub fn get(&self, circuit: &str) -> anyhow::Result<ZkConfig> {
        let read = |path: PathBuf| {
            std::fs::read(&path)
                .with_context(|| format!("Failed to read ZK material {}", path.display()))
        };

        Ok(ZkConfig {
            circuit_id: circuit.to_string(),
            prover_key: read(self.prover_key_path(circuit))?,
            verifier_key: read(self.verifier_key_path(circuit))?,
            zkir: read(self.zkir_path(circuit))?,
        })
    }

    pub fn get_many(&self, circuits: &[String]) -> anyhow::Result<Vec<ZkConfig>> {
        circuits.iter().map(|c| self.get(c)).collect()
    }
}
