//! Contract compilation.
//!
//! Contracts are compiled by an external compiler into
//! `<source dir>/managed/<contract name>/`. A usable artifact contains at least the
//! JavaScript contract module and the compiler's description of the contract circuits.

mod cmd;

use std::{
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
};

use serde::Deserialize;

pub use cmd::CompileCmdBuilder;

use crate::{
    config::ToolchainConfig,
    error::{CompilerStatus, DeployError, Result},
};

/// Directory, relative to the contract source directory, receiving compiled artifacts.
pub const MANAGED_DIR: &str = "managed";

/// Contract module inside an artifact directory.
pub const CONTRACT_MODULE: &str = "contract/index.cjs";

/// Circuit description inside an artifact directory.
pub const CONTRACT_INFO: &str = "compiler/contract-info.json";

/// Compiles contract sources into artifact directories.
pub trait ContractCompiler: Send + Sync {
    /// Compile `source` into `output`.
    fn compile(
        &self,
        name: &str,
        source: &Path,
        output: &Path,
    ) -> impl Future<Output = Result<CompiledArtifact>> + Send;
}

/// A compiled contract, ready to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    /// Contract name.
    pub name: String,
    /// Artifact directory.
    pub dir: PathBuf,
    /// Circuits and witnesses declared by the contract.
    pub info: ContractInfo,
}

impl CompiledArtifact {
    /// The artifact directory of a contract compiled from `source`.
    pub fn output_dir(name: &str, source: &Path) -> PathBuf {
        let source_dir = match source.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        source_dir.join(MANAGED_DIR).join(name)
    }

    /// Load an artifact from its directory.
    pub fn load(name: &str, dir: &Path) -> anyhow::Result<Self> {
        let module = dir.join(CONTRACT_MODULE);
        if !module.is_file() {
            anyhow::bail!("Missing contract module {}", module.display());
        }

        let info_path = dir.join(CONTRACT_INFO);
        let content = std::fs::read_to_string(&info_path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", info_path.display(), e))?;
        let info: ContractInfo = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", info_path.display(), e))?;

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            info,
        })
    }

    pub fn module_path(&self) -> PathBuf {
        self.dir.join(CONTRACT_MODULE)
    }

    /// Look up a circuit by name.
    pub fn circuit(&self, name: &str) -> Option<&CircuitInfo> {
        self.info.circuits.iter().find(|c| c.name == name)
    }
}

/// Compiler description of a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContractInfo {
    #[serde(default)]
    pub circuits: Vec<CircuitInfo>,
    #[serde(default)]
    pub witnesses: Vec<WitnessInfo>,
}

/// An exported circuit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CircuitInfo {
    pub name: String,
    /// Pure circuits do not touch the ledger and cannot be called as transactions.
    #[serde(default)]
    pub pure: bool,
    #[serde(default)]
    pub arguments: Vec<ArgumentInfo>,
}

/// A declared circuit parameter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArgumentInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ArgumentType,
}

/// Type of a circuit parameter, as reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type-name")]
pub enum ArgumentType {
    Bytes {
        length: usize,
    },
    Uint,
    Field,
    Boolean,
    Opaque {
        #[serde(rename = "tsType")]
        ts_type: String,
    },
    #[serde(other)]
    Other,
}

/// A declared witness.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WitnessInfo {
    pub name: String,
}

/// Compiler invoked as a subprocess.
#[derive(Debug, Clone)]
pub struct CompactCompiler {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl CompactCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(config: &ToolchainConfig) -> Self {
        Self {
            program: config.compiler.clone(),
            extra_args: config.compiler_args.clone(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl ContractCompiler for CompactCompiler {
    async fn compile(&self, name: &str, source: &Path, output: &Path) -> Result<CompiledArtifact> {
        let args = CompileCmdBuilder::new(source, output)
            .extra_args(self.extra_args.iter().cloned())
            .build();

        tracing::debug!(
            contract = %name,
            compiler = %self.program.display(),
            ?args,
            "Running compiler"
        );

        let result = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                return Err(DeployError::Compilation {
                    contract: name.to_string(),
                    status: CompilerStatus::NotStarted,
                    output: format!("{}: {}", self.program.display(), e),
                });
            }
        };

        let mut captured = String::from_utf8_lossy(&out.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&out.stderr));

        if !out.status.success() {
            return Err(DeployError::Compilation {
                contract: name.to_string(),
                status: CompilerStatus::Exited(out.status),
                output: captured,
            });
        }

        tracing::trace!(contract = %name, output = %captured, "Compiler output");

        CompiledArtifact::load(name, output).map_err(|e| DeployError::Compilation {
            contract: name.to_string(),
            status: CompilerStatus::IncompleteArtifact,
            output: format!("{e:#}\n{captured}"),
        })
    }
}
