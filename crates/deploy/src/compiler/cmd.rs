//! Command builder for the contract compiler.

use std::path::Path;

/// Builder for compiler invocations: `[extra args...] <source> <output dir>`.
#[derive(Debug, Clone)]
pub struct CompileCmdBuilder {
    source: String,
    output: String,
    extra_args: Vec<String>,
}

impl CompileCmdBuilder {
    /// Create a new builder compiling `source` into `output`.
    pub fn new(source: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            source: source.as_ref().display().to_string(),
            output: output.as_ref().display().to_string(),
            extra_args: Vec::new(),
        }
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the command arguments.
    pub fn build(self) -> Vec<String> {
        let mut cmd = self.extra_args;
        cmd.push(self.source);
        cmd.push(self.output);

        cmd
    }
}
