//! Content source abstraction for reading design and component files.

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;

/// Trait for abstracting file I/O (filesystem vs. in-memory fixtures).
pub trait ContentSource {
    /// Read a file at the given logical path and return its content as a string.
    fn read_to_string(&mut self, path: &Utf8Path) -> Result<String>;
    /// List files in a directory path (logical path for the source), returning full paths.
    fn list_dir(&mut self, path: &Utf8Path) -> Result<Vec<Utf8PathBuf>>;
}

/// Reads files directly from the local filesystem.
pub struct FsSource;

impl ContentSource for FsSource {
    fn read_to_string(&mut self, path: &Utf8Path) -> Result<String> {
        std::fs::read_to_string(path.as_std_path()).with_context(|| format!("Failed to read {}", path))
    }

    fn list_dir(&mut self, path: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        let mut files = Vec::new();
        for entry in
            std::fs::read_dir(path.as_std_path()).with_context(|| format!("Read dir {}", path))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let p = Utf8PathBuf::from_path_buf(entry.path())
                    .map_err(|_| anyhow!("Non-UTF8 path in {}", path))?;
                files.push(p);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Files held in memory, keyed by logical path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<Utf8PathBuf, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<Utf8PathBuf>, text: impl Into<String>) -> Self {
        self.files.insert(path.into(), text.into());
        self
    }
}

impl ContentSource for MemorySource {
    fn read_to_string(&mut self, path: &Utf8Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("File {} not found in memory source", path))
    }

    fn list_dir(&mut self, path: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        Ok(self
            .files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}
