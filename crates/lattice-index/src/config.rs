//! Index configuration
//!
//! Loaded from `lattice.toml` at the repository root when present;
//! everything has a default so the file is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::extractor::DEFAULT_MAX_FILE_BYTES;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Project name used as the identifier prefix.
    pub project: String,
    /// Files above this size are skipped.
    pub max_file_bytes: u64,
    /// Concurrent file analyses in a batch.
    pub parallelism: usize,
    /// Materialize inferable edges right after a batch.
    pub infer_after_analysis: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            project: "proj".to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            parallelism: default_parallelism(),
            infer_after_analysis: false,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl IndexConfig {
    /// Load `lattice.toml` from `root`, falling back to defaults when the
    /// file does not exist.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = root.join("lattice.toml");
        if !path.exists() {
            return Ok(IndexConfig::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let config: IndexConfig = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded index config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::load(dir.path()).unwrap();
        assert_eq!(config.project, "proj");
        assert_eq!(config.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lattice.toml"), "project = \"acme\"\n").unwrap();
        let config = IndexConfig::load(dir.path()).unwrap();
        assert_eq!(config.project, "acme");
        assert_eq!(config.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
    }
}
