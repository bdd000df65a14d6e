//! File-backed private state store.
//!
//! Layout under `<root>/<store name>/`:
//!
//! ```text
//! .lock
//! private-states/<id>.json
//! signing-keys/<contract address>
//! ```
//!
//! Ids and addresses are escaped into file names, so any non-empty id is
//! accepted.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

use crate::{fs::FsHandler, tx::ContractAddress};

const LOCK_FILE: &str = ".lock";
const PRIVATE_STATES_DIR: &str = "private-states";
const SIGNING_KEYS_DIR: &str = "signing-keys";

/// Local store of contract private states and signing keys.
#[derive(Debug, Clone)]
pub struct FilePrivateStateStore {
    dir: PathBuf,
}

impl FilePrivateStateStore {
    /// Open (and create if needed) the store `name` under `root`.
    pub fn open(root: &Path, name: &str) -> anyhow::Result<Self> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            anyhow::bail!("Invalid private state store name '{}'", name);
        }

        let dir = root.join(name);
        FsHandler::create_dir(&dir.join(PRIVATE_STATES_DIR))?;
        FsHandler::create_dir(&dir.join(SIGNING_KEYS_DIR))?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read a private state, `None` if it was never stored.
    pub fn get(&self, id: &str) -> anyhow::Result<Option<Value>> {
        let path = self.state_path(id)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read private state {}", path.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse private state {}", path.display()))?;

        Ok(Some(state))
    }

    /// Store a private state, replacing any previous value.
    pub fn set(&self, id: &str, state: &Value) -> anyhow::Result<()> {
        let path = self.state_path(id)?;
        let _lock = self.lock()?;
        FsHandler::write_json(&path, state)?;
        tracing::trace!(id, path = %path.display(), "Stored private state");
        Ok(())
    }

    pub fn set_signing_key(&self, address: &ContractAddress, key: &str) -> anyhow::Result<()> {
        let path = self.signing_key_path(address)?;
        let _lock = self.lock()?;
        FsHandler::write_atomic(&path, key.as_bytes())?;
        tracing::trace!(address = %address, "Stored signing key");
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<std::fs::File> {
        FsHandler::lock_exclusive(&self.dir.join(LOCK_FILE))
    }

    fn state_path(&self, id: &str) -> anyhow::Result<PathBuf> {
        let key = file_key(id)?;
        Ok(self.dir.join(PRIVATE_STATES_DIR).join(format!("{key}.json")))
    }

    fn signing_key_path(&self, address: &ContractAddress) -> anyhow::Result<PathBuf> {
        let key = file_key(&address.0)?;
        Ok(self.dir.join(SIGNING_KEYS_DIR).join(key))
    }
}

/// File name of a store entry.
///
/// Bytes outside `[A-Za-z0-9_-]` are percent-escaped, as is a leading dot, so distinct
/// keys map to distinct files that stay inside the store.
fn file_key(value: &str) -> anyhow::Result<String> {
    if value.is_empty() {
        anyhow::bail!("Private state key must not be empty");
    }

    let mut key = String::with_capacity(value.len());
    for (i, byte) in value.bytes().enumerate() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => key.push(char::from(byte)),
            b'.' if i > 0 => key.push('.'),
            _ => key.push_str(&format!("%{byte:02X}")),
        }
    }
    Ok(key)
}
