//! File system utils.

use std::{fs::File, path::Path};

use anyhow::Context;
use fs2::FileExt;
use serde::Serialize;

pub struct FsHandler;

impl FsHandler {
    /// Create a directory and its parents if it doesn't exist.
    pub fn create_dir(path: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
        tracing::trace!("Created directory: {}", path.display());
        Ok(())
    }

    /// Replace the content of `path` with `contents`.
    ///
    /// The data is written to a sibling temporary file which is then renamed over the
    /// target, so readers never observe a partially written file.
    pub fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        Self::create_dir(parent)?;

        let file_name = path
            .file_name()
            .with_context(|| format!("Path has no file name: {}", path.display()))?;
        let tmp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to move {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    /// Serialize `value` as pretty JSON and write it atomically.
    pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
        let mut contents =
            serde_json::to_vec_pretty(value).context("Failed to serialize JSON document")?;
        contents.push(b'\n');
        Self::write_atomic(path, &contents)
    }

    /// Take an exclusive advisory lock on `path`, creating the file if needed.
    ///
    /// The lock is released when the returned file is dropped.
    pub fn lock_exclusive(path: &Path) -> anyhow::Result<File> {
        if let Some(parent) = path.parent() {
            Self::create_dir(parent)?;
        }

        let file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;

        Ok(file)
    }
}
