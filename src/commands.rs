//! CLI command implementations
//!
//! The application root lives here: each command opens the store, builds
//! the registry, and wires the coordinator/engine/resolver it needs.
//! Exit code is non-zero iff at least one item failed.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;

use lattice_core::{EdgeTypeRegistry, GraphStore, NodeIdentifier, UnknownSymbolFilter};
use lattice_index::{AnalysisCoordinator, IndexConfig};
use lattice_infer::{
    HierarchicalOptions, InferenceEngine, TransitiveOptions, UnknownSymbolResolver,
};
use lattice_query::{GraphQuery, QueryExecutor};

/// Database location inside the repository: `.lattice/graph.db`.
const STORE_DIR: &str = ".lattice";
const STORE_FILE: &str = "graph.db";

fn open_store(root: &PathBuf) -> anyhow::Result<Arc<GraphStore>> {
    let dir = root.join(STORE_DIR);
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let store = GraphStore::open(&dir.join(STORE_FILE))?;
    Ok(Arc::new(store))
}

pub async fn analyze(root: PathBuf, paths: Vec<String>, json: bool) -> anyhow::Result<()> {
    let store = open_store(&root)?;
    let config = IndexConfig::load(&root)?;
    let run_inference = config.infer_after_analysis;
    let coordinator = Arc::new(AnalysisCoordinator::new(
        Arc::clone(&store),
        config,
        root.clone(),
    ));

    let cancel = CancellationToken::new();
    let report = if paths.is_empty() {
        coordinator.analyze_directory(cancel).await
    } else {
        coordinator.analyze_paths(paths, cancel).await
    };

    if run_inference && !report.touched_edge_types.is_empty() {
        let engine = InferenceEngine::new(Arc::clone(&store), Arc::new(EdgeTypeRegistry::with_builtins()));
        for edge_type in &report.touched_edge_types {
            engine.process_change(lattice_infer::ChangeEvent::EdgeWritten {
                edge_type: edge_type.clone(),
            });
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "analyzed {} file(s), {} failed{}",
            report.succeeded.len(),
            report.failed(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        for failure in &report.failures {
            println!("  {}: {} ({})", failure.path, failure.message, failure.kind);
        }
    }

    if report.failed() > 0 {
        bail!("{} file(s) failed", report.failed());
    }
    Ok(())
}

pub fn query(root: PathBuf, raw: String) -> anyhow::Result<()> {
    let raw = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("read {path}"))?,
        None => raw,
    };
    let query: GraphQuery = serde_json::from_str(&raw).context("parse query JSON")?;

    let store = open_store(&root)?;
    let executor = QueryExecutor::new(store);
    let rows = executor.run(&query)?;
    for row in rows {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

pub fn symbols(
    root: PathBuf,
    name: String,
    file: Option<String>,
    limit: u32,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_store(&root)?;
    let resolver = UnknownSymbolResolver::new(Arc::clone(&store));

    let filter = UnknownSymbolFilter {
        source_file: file,
        limit: Some(limit.max(1) * 8),
        ..Default::default()
    };
    let unknowns = resolver.search_unknowns(&name, &filter)?;

    let mut shown = 0;
    for unknown in unknowns.iter().take(limit as usize) {
        let candidates = resolver.find_candidates(unknown)?;
        if json {
            let payload = serde_json::json!({
                "unknown": unknown,
                "candidates": candidates
                    .iter()
                    .map(|c| serde_json::json!({
                        "identifier": c.node.identifier.to_string(),
                        "score": c.score,
                        "rule": c.rule,
                    }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string(&payload)?);
        } else {
            println!(
                "{} ({} in {}:{})",
                unknown.name,
                unknown.kind,
                unknown.source_file,
                unknown.line
            );
            for candidate in candidates.iter().take(3) {
                println!(
                    "  {:.2}  {}  [{}]",
                    candidate.score, candidate.node.identifier, candidate.rule
                );
            }
        }
        shown += 1;
    }
    if shown == 0 && !json {
        println!("no unknown symbols matched '{name}'");
    }
    Ok(())
}

pub fn infer(
    root: PathBuf,
    from: String,
    edge_type: String,
    depth: u32,
    hierarchical: bool,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_store(&root)?;
    let registry = Arc::new(EdgeTypeRegistry::with_builtins());
    let engine = InferenceEngine::new(Arc::clone(&store), registry);

    let identifier = NodeIdentifier::from_str(&from)?;
    let node = store
        .get_node_by_identifier(&identifier)?
        .with_context(|| format!("no node {from}"))?;

    if hierarchical {
        let result = engine.query_hierarchical(
            node.id,
            &edge_type,
            HierarchicalOptions {
                include_parents: true,
                include_children: false,
                max_depth: depth,
            },
        )?;
        for hit in &result.hits {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "target": hit.target.identifier.to_string(),
                        "rule": hit.rule,
                    })
                );
            } else {
                match &hit.rule {
                    Some(rule) => println!("{}  [{}]", hit.target.identifier, rule),
                    None => println!("{}", hit.target.identifier),
                }
            }
        }
    } else {
        let result = engine.query_transitive(
            node.id,
            &edge_type,
            TransitiveOptions {
                max_depth: depth,
                ..Default::default()
            },
        )?;
        for target in &result.targets {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "target": target.node.identifier.to_string(),
                        "depth": target.depth,
                        "path": target.path.iter().map(|e| e.0).collect::<Vec<_>>(),
                    })
                );
            } else {
                println!("{}  depth={}", target.node.identifier, target.depth);
            }
        }
        if result.cycle_detected && !json {
            println!("(cycle detected)");
        }
        if result.truncated && !json {
            println!("(truncated at depth {depth})");
        }
    }
    Ok(())
}

pub fn stats(root: PathBuf, json: bool) -> anyhow::Result<()> {
    let store = open_store(&root)?;
    let registry = EdgeTypeRegistry::with_builtins();
    let store_stats = store.statistics()?;
    let equivalence_stats = store.equivalence_statistics()?;
    let registry_stats = registry.statistics();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "store": store_stats,
                "equivalences": equivalence_stats,
                "registry": registry_stats,
            }))?
        );
        return Ok(());
    }

    println!("nodes: {}", store_stats.nodes);
    for (kind, count) in &store_stats.nodes_by_kind {
        println!("  {kind}: {count}");
    }
    println!("edges: {}", store_stats.edges);
    for (edge_type, count) in &store_stats.edges_by_type {
        println!("  {edge_type}: {count}");
    }
    println!("unknown symbols: {}", store_stats.unknown_symbols);
    println!(
        "equivalences: {} ({} validated)",
        equivalence_stats.total_equivalences, equivalence_stats.validated
    );
    println!(
        "edge types: {} ({} transitive, {} inheritable)",
        registry_stats.total, registry_stats.transitive, registry_stats.inheritable
    );
    Ok(())
}

pub fn maintain(
    root: PathBuf,
    backup: Option<PathBuf>,
    checkpoint: bool,
    optimize: bool,
) -> anyhow::Result<()> {
    let store = open_store(&root)?;
    if let Some(destination) = backup {
        store.backup(&destination)?;
        println!("backup written to {}", destination.display());
    }
    if checkpoint {
        store.checkpoint()?;
        println!("checkpoint complete");
    }
    if optimize {
        store.optimize()?;
        println!("optimize complete");
    }
    Ok(())
}
