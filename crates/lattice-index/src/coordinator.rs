//! Analysis orchestration
//!
//! One file: read → parse → extract → a single `replace_file` transaction.
//! Many files: bounded fan-out where every file is an independent
//! transaction and failures land in their own result slot.

use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use lattice_core::store::NodeFilter;
use lattice_core::{Error, GraphStore, NodeKind, Result};

use crate::config::IndexConfig;
use crate::extractor::{Extractor, ImportTargetResolver};

/// Extensions probed when a local import omits one.
const RESOLVE_EXTENSIONS: &[&str] = &[
    ".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".py", ".go", ".java", ".md", ".mdx",
];

/// Outcome of one file's analysis.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileReport {
    pub path: String,
    pub nodes: usize,
    pub edges: usize,
    pub unknowns: usize,
    pub warnings: Vec<String>,
    /// Distinct edge types this file wrote.
    pub edge_types: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FileFailure {
    pub path: String,
    pub kind: String,
    pub message: String,
}

/// Aggregate outcome of a batch.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
    pub cancelled: bool,
    /// Edge types written by this batch; callers feed these to the
    /// inference engine when eager materialization is wanted.
    pub touched_edge_types: Vec<String>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

pub struct AnalysisCoordinator {
    store: Arc<GraphStore>,
    config: IndexConfig,
    repo_root: PathBuf,
}

impl AnalysisCoordinator {
    pub fn new(store: Arc<GraphStore>, config: IndexConfig, repo_root: PathBuf) -> Self {
        AnalysisCoordinator {
            store,
            config,
            repo_root,
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Analyze one repository-relative file inside one transaction.
    pub async fn analyze_file(&self, rel_path: &str) -> Result<FileReport> {
        let abs = self.repo_root.join(rel_path);
        let content = tokio::fs::read_to_string(&abs).await.map_err(|e| Error::Storage {
            category: lattice_core::SqlCategory::Read,
            message: format!("read {}: {e}", abs.display()),
        })?;
        self.analyze_content(rel_path, content).await
    }

    async fn analyze_content(&self, rel_path: &str, content: String) -> Result<FileReport> {
        let extractor = Extractor::new(&self.config.project)
            .with_max_file_bytes(self.config.max_file_bytes);
        let resolver = StoreResolver {
            store: Arc::clone(&self.store),
            repo_root: self.repo_root.clone(),
        };
        let path = rel_path.to_string();

        let extraction = tokio::task::spawn_blocking(move || {
            extractor.extract(&path, &content, &resolver)
        })
        .await
        .map_err(|e| Error::Storage {
            category: lattice_core::SqlCategory::Read,
            message: format!("extraction task join: {e}"),
        })??;

        for warning in &extraction.warnings {
            tracing::warn!(path = rel_path, "{warning}");
        }

        self.store.replace_file(rel_path, &extraction.nodes, &extraction.edges)?;
        for unknown in &extraction.unknowns {
            self.store.insert_unknown_symbol(unknown)?;
        }

        tracing::debug!(
            path = rel_path,
            nodes = extraction.nodes.len(),
            edges = extraction.edges.len(),
            "analyzed file"
        );

        let edge_types: BTreeSet<String> =
            extraction.edges.iter().map(|e| e.edge_type.clone()).collect();

        Ok(FileReport {
            path: rel_path.to_string(),
            nodes: extraction.nodes.len(),
            edges: extraction.edges.len(),
            unknowns: extraction.unknowns.len(),
            warnings: extraction.warnings.clone(),
            edge_types: edge_types.into_iter().collect(),
        })
    }

    /// Analyze many files with bounded parallelism. Each file commits (or
    /// fails) independently; cancellation is observed at file boundaries
    /// and leaves committed work in place.
    pub async fn analyze_paths(
        self: &Arc<Self>,
        paths: Vec<String>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut join_set = JoinSet::new();

        for path in paths {
            if cancel.is_cancelled() {
                break;
            }
            let coordinator = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                if cancel.is_cancelled() {
                    return (path, Err(Error::Cancelled));
                }
                let result = coordinator.analyze_file(&path).await;
                (path, result)
            });
        }

        let mut report = BatchReport::default();
        let mut touched: BTreeSet<String> = BTreeSet::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_path, Ok(file_report))) => {
                    touched.extend(file_report.edge_types.iter().cloned());
                    report.succeeded.push(file_report);
                }
                Ok((path, Err(Error::Cancelled))) => {
                    tracing::debug!(path = %path, "analysis cancelled");
                    report.cancelled = true;
                }
                Ok((path, Err(err))) => {
                    tracing::warn!(path = %path, error = %err, "file analysis failed");
                    report.failures.push(FileFailure {
                        path,
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    });
                }
                Err(join_err) => {
                    report.failures.push(FileFailure {
                        path: String::new(),
                        kind: "storage_failure".to_string(),
                        message: format!("task join: {join_err}"),
                    });
                }
            }
        }
        report.cancelled |= cancel.is_cancelled();
        report.touched_edge_types = touched.into_iter().collect();
        report
    }

    /// Walk the repository (gitignore-aware) and analyze every recognized
    /// file.
    pub async fn analyze_directory(self: &Arc<Self>, cancel: CancellationToken) -> BatchReport {
        let paths = collect_source_files(&self.repo_root);
        tracing::info!(count = paths.len(), "discovered source files");
        self.analyze_paths(paths, cancel).await
    }
}

/// Recognized files under `root`, repository-relative with forward slashes.
pub fn collect_source_files(root: &Path) -> Vec<String> {
    let mut paths = Vec::new();
    for entry in ignore::WalkBuilder::new(root).build().flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if lattice_core::Syntax::detect(path).is_err() {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(root) {
            paths.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    paths.sort();
    paths
}

/// Resolves local import specs against already-known file nodes first, then
/// the filesystem.
struct StoreResolver {
    store: Arc<GraphStore>,
    repo_root: PathBuf,
}

impl ImportTargetResolver for StoreResolver {
    fn resolve(&self, from_file: &str, spec: &str) -> Option<String> {
        let base = normalize_relative(from_file, spec)?;

        let mut candidates = Vec::new();
        let has_known_extension = RESOLVE_EXTENSIONS.iter().any(|ext| base.ends_with(ext));
        if has_known_extension {
            candidates.push(base.clone());
        } else {
            for ext in RESOLVE_EXTENSIONS {
                candidates.push(format!("{base}{ext}"));
            }
            for ext in [".ts", ".tsx", ".js", ".jsx"] {
                candidates.push(format!("{base}/index{ext}"));
            }
        }

        let known: HashSet<String> = self
            .store
            .find_nodes(&NodeFilter {
                source_files: Some(candidates.clone()),
                kinds: Some(vec![NodeKind::File]),
                ..Default::default()
            })
            .ok()?
            .into_iter()
            .filter_map(|n| n.source_file)
            .collect();

        for candidate in &candidates {
            if known.contains(candidate) {
                return Some(candidate.clone());
            }
        }
        for candidate in &candidates {
            if self.repo_root.join(candidate).is_file() {
                return Some(candidate.clone());
            }
        }
        None
    }
}

/// Join `spec` onto the directory of `from_file` and normalize `.`/`..`
/// components. Returns `None` when the spec escapes the repository root.
fn normalize_relative(from_file: &str, spec: &str) -> Option<String> {
    let joined = if let Some(rooted) = spec.strip_prefix('/') {
        PathBuf::from(rooted)
    } else {
        let dir = Path::new(from_file).parent().unwrap_or_else(|| Path::new(""));
        dir.join(spec)
    };

    let mut parts: Vec<String> = Vec::new();
    for component in joined.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_relative_specs() {
        assert_eq!(
            normalize_relative("src/UserService.ts", "./helpers/Helper"),
            Some("src/helpers/Helper".to_string())
        );
        assert_eq!(
            normalize_relative("src/a/b.ts", "../c"),
            Some("src/c".to_string())
        );
        assert_eq!(normalize_relative("a.ts", "../escape"), None);
        assert_eq!(
            normalize_relative("a.ts", "/src/rooted"),
            Some("src/rooted".to_string())
        );
    }
}
