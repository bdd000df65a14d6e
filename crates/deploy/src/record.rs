//! Deployment record: contract name to address, written once at the end of a run.

use std::path::Path;

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{
    error::{DeployError, Result},
    fs::FsHandler,
    tx::ContractAddress,
};

/// Addresses of the contracts deployed by a run, in deployment order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentRecord {
    entries: Vec<(String, ContractAddress)>,
}

impl DeploymentRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the address of `name`. A repeated name replaces the earlier address.
    pub fn record(&mut self, name: &str, address: ContractAddress) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => {
                tracing::warn!(
                    contract = %name,
                    previous = %existing,
                    address = %address,
                    "Contract recorded twice, keeping the latest address"
                );
                *existing = address;
            }
            None => self.entries.push((name.to_string(), address)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ContractAddress> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContractAddress)> {
        self.entries.iter().map(|(n, a)| (n.as_str(), a))
    }

    /// Write the record as a pretty-printed JSON object, replacing any existing file.
    pub fn flush(&self, path: &Path) -> Result<()> {
        FsHandler::write_json(path, self).map_err(|e| {
            DeployError::Persistence(e.context(format!("Failed to write {}", path.display())))
        })?;

        tracing::debug!(path = %path.display(), contracts = self.len(), "Deployment record written");
        Ok(())
    }
}

impl Serialize for DeploymentRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, address) in &self.entries {
            map.serialize_entry(name, address)?;
        }
        map.end()
    }
}
