//! Integration tests for Lattice
//!
//! End-to-end scenarios across parsing, extraction, storage, and
//! inference, driven through the analysis coordinator over a real
//! temporary repository.

use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use lattice_core::registry::{EdgeTypeSpec, edge_types, rules};
use lattice_core::store::{EdgeFilter, NodeFilter, UnknownSymbolFilter};
use lattice_core::{
    EdgeDraft, EdgeTypeRegistry, GraphStore, NodeIdentifier, NodeKind,
};
use lattice_index::{AnalysisCoordinator, IndexConfig};
use lattice_infer::{
    HierarchicalOptions, InferenceEngine, TransitiveOptions, UnknownSymbolResolver,
};

struct TestRepo {
    dir: TempDir,
    store: Arc<GraphStore>,
    coordinator: Arc<AnalysisCoordinator>,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(GraphStore::in_memory().unwrap());
        let coordinator = Arc::new(AnalysisCoordinator::new(
            Arc::clone(&store),
            IndexConfig::default(),
            dir.path().to_path_buf(),
        ));
        TestRepo {
            dir,
            store,
            coordinator,
        }
    }

    fn write(&self, rel_path: &str, content: &str) {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    async fn analyze(&self, paths: &[&str]) {
        let report = self
            .coordinator
            .analyze_paths(
                paths.iter().map(|p| p.to_string()).collect(),
                CancellationToken::new(),
            )
            .await;
        assert!(
            report.failures.is_empty(),
            "analysis failures: {:?}",
            report.failures
        );
    }

    fn engine(&self) -> InferenceEngine {
        InferenceEngine::new(
            Arc::clone(&self.store),
            Arc::new(EdgeTypeRegistry::with_builtins()),
        )
    }

    fn node(&self, identifier: &str) -> lattice_core::GraphNode {
        self.store
            .get_node_by_identifier(&identifier.parse::<NodeIdentifier>().unwrap())
            .unwrap()
            .unwrap_or_else(|| panic!("missing node {identifier}"))
    }
}

#[tokio::test]
async fn typescript_import_local_and_package() {
    let repo = TestRepo::new();
    repo.write("src/helpers/Helper.ts", "export class Helper {}\n");
    repo.write(
        "src/UserService.ts",
        "import React from 'react';\nimport { Helper } from './helpers/Helper';\nexport class UserService {}\n",
    );

    repo.analyze(&["src/helpers/Helper.ts", "src/UserService.ts"]).await;

    let file = repo.node("proj/src/UserService.ts#file:UserService.ts");
    let class = repo.node("proj/src/UserService.ts#class:UserService");
    let react = repo.node("proj//#package:react");
    let helper = repo.node("proj/src/helpers/Helper.ts#file:Helper.ts");

    // depends_on edges surface through the specialization closure.
    let engine = repo.engine();
    let depends: Vec<_> = engine
        .edges_with_specialization(file.id, edge_types::DEPENDS_ON)
        .unwrap();
    let targets: Vec<_> = depends.iter().map(|e| e.target).collect();
    assert!(targets.contains(&react.id), "package dependency");
    assert!(targets.contains(&helper.id), "local file dependency");

    let contains = repo
        .store
        .find_edges(&EdgeFilter {
            source: Some(file.id),
            edge_types: Some(vec![edge_types::CONTAINS.to_string()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(contains.len(), 1);
    assert_eq!(contains[0].target, class.id);
}

#[tokio::test]
async fn re_export_follows_with_implicit_depends_on() {
    let repo = TestRepo::new();
    repo.write("src/helpers/Helper.ts", "export class Helper {}\n");
    repo.write("src/index.ts", "export { Helper } from './helpers/Helper';\n");

    repo.analyze(&["src/helpers/Helper.ts", "src/index.ts"]).await;

    let index = repo.node("proj/src/index.ts#file:index.ts");
    let helper = repo.node("proj/src/helpers/Helper.ts#file:Helper.ts");

    let re_exports = repo
        .store
        .find_edges(&EdgeFilter {
            source: Some(index.id),
            edge_types: Some(vec![edge_types::RE_EXPORTS.to_string()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(re_exports.len(), 1);
    assert_eq!(re_exports[0].target, helper.id);

    let engine = repo.engine();
    let depends = engine
        .edges_with_specialization(index.id, edge_types::DEPENDS_ON)
        .unwrap();
    let spec_rule = rules::specialization_of(edge_types::RE_EXPORTS, edge_types::DEPENDS_ON);
    assert!(
        depends
            .iter()
            .any(|e| e.target == helper.id && e.rule.as_deref() == Some(spec_rule.as_str())),
        "implicit depends_on from the specialization rule"
    );
}

#[tokio::test]
async fn transitive_query_with_cycle() {
    let repo = TestRepo::new();
    repo.write("A.ts", "import './B';\nexport const a = 1;\n");
    repo.write("B.ts", "import './C';\nexport const b = 1;\n");
    repo.write("C.ts", "import './A';\nexport const c = 1;\n");

    repo.analyze(&["A.ts", "B.ts", "C.ts"]).await;

    let a = repo.node("proj/A.ts#file:A.ts");
    let engine = repo.engine();
    let result = engine
        .query_transitive(
            a.id,
            edge_types::DEPENDS_ON,
            TransitiveOptions {
                max_depth: 10,
                ..Default::default()
            },
        )
        .unwrap();

    let names: Vec<&str> = result.targets.iter().map(|t| t.node.name.as_str()).collect();
    assert_eq!(names, vec!["B.ts", "C.ts"], "start node excluded, no duplicates");
    assert!(result.cycle_detected);
}

#[tokio::test]
async fn hierarchical_inheritance_of_inheritable_edge() {
    let repo = TestRepo::new();
    repo.write(
        "F.ts",
        "export class Base {}\nexport class Derived extends Base {}\nexport class Widget {}\n",
    );
    repo.analyze(&["F.ts"]).await;

    let base = repo.node("proj/F.ts#class:Base");
    let derived = repo.node("proj/F.ts#class:Derived");
    let widget = repo.node("proj/F.ts#class:Widget");

    // Base renders Widget.
    repo.store
        .upsert_edge(&EdgeDraft::explicit(
            base.identifier.clone(),
            widget.identifier.clone(),
            edge_types::RENDERS,
        ))
        .unwrap();

    // A registry where extends is the hierarchy and renders inherits.
    let registry = EdgeTypeRegistry::new();
    registry
        .register(EdgeTypeSpec::new(edge_types::EXTENDS).hierarchical())
        .unwrap();
    registry
        .register(EdgeTypeSpec::new(edge_types::RENDERS).inheritable())
        .unwrap();
    let engine = InferenceEngine::new(Arc::clone(&repo.store), Arc::new(registry));

    let result = engine
        .query_hierarchical(
            derived.id,
            edge_types::RENDERS,
            HierarchicalOptions {
                include_parents: true,
                include_children: false,
                max_depth: 8,
            },
        )
        .unwrap();

    let inherited: Vec<_> = result
        .hits
        .iter()
        .filter(|h| h.rule.as_deref() == Some(rules::INHERITED_VIA_HIERARCHY))
        .collect();
    assert_eq!(inherited.len(), 1);
    assert_eq!(inherited[0].target.id, widget.id);
}

#[tokio::test]
async fn unknown_symbol_equivalence_end_to_end() {
    let repo = TestRepo::new();
    repo.write("types.ts", "const current: User = fetchCurrent();\n");
    repo.write("models/User.ts", "export class User {}\n");

    repo.analyze(&["types.ts", "models/User.ts"]).await;

    let resolver = UnknownSymbolResolver::new(Arc::clone(&repo.store));
    let unknowns = repo
        .store
        .find_unknown_symbols(&UnknownSymbolFilter {
            name: Some("User".into()),
            source_file: Some("types.ts".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(unknowns.len(), 1, "User reference is unresolved");
    let unknown = &unknowns[0];

    let candidates = resolver.find_candidates(unknown).unwrap();
    assert!(!candidates.is_empty());
    let best = &candidates[0];
    assert_eq!(best.rule, "exact_name_match");
    assert!(best.score >= 0.9);
    assert_eq!(best.node.identifier.to_string(), "proj/models/User.ts#class:User");

    // Give the known class an outgoing edge, then follow it through the
    // validated equivalence.
    repo.write("models/Role.ts", "export class Role {}\n");
    repo.analyze(&["models/Role.ts"]).await;
    let role = repo.node("proj/models/Role.ts#class:Role");
    repo.store
        .upsert_edge(&EdgeDraft::explicit(
            best.node.identifier.clone(),
            role.identifier.clone(),
            edge_types::REFERENCES,
        ))
        .unwrap();

    let relation = resolver
        .create_equivalence(unknown.id, best.node.id, best.score, best.rule)
        .unwrap();
    assert!(resolver.validate(&relation).unwrap());

    let edges = resolver.edges_for_unknown(unknown.id, true).unwrap();
    assert!(edges.iter().any(|e| e.target == role.id));
}

#[tokio::test]
async fn replace_file_orphan_cleanup() {
    let repo = TestRepo::new();
    repo.write("B.ts", "export class B {}\n");
    repo.write("A.ts", "import { B } from './B';\nexport class Widget {}\n");
    repo.analyze(&["B.ts", "A.ts"]).await;

    assert!(
        repo.store
            .get_node_by_identifier(&"proj/A.ts#class:Widget".parse().unwrap())
            .unwrap()
            .is_some()
    );

    // A.ts shrinks to an empty module.
    repo.write("A.ts", "export {};\n");
    repo.analyze(&["A.ts"]).await;

    assert!(
        repo.store
            .get_node_by_identifier(&"proj/A.ts#class:Widget".parse().unwrap())
            .unwrap()
            .is_none(),
        "class node removed"
    );

    let a = repo.node("proj/A.ts#file:A.ts");
    let outgoing = repo
        .store
        .find_edges(&EdgeFilter {
            source: Some(a.id),
            ..Default::default()
        })
        .unwrap();
    assert!(outgoing.is_empty(), "import edge removed");

    // B.ts's node is unchanged.
    let b = repo.node("proj/B.ts#file:B.ts");
    assert_eq!(b.name, "B.ts");
}

#[tokio::test]
async fn idempotent_ingestion() {
    let repo = TestRepo::new();
    repo.write("src/a.ts", "import { B } from './b';\nexport class A {}\n");
    repo.write("src/b.ts", "export class B {}\n");

    repo.analyze(&["src/b.ts", "src/a.ts"]).await;
    let first_stats = repo.store.statistics().unwrap();
    let class_before = repo.node("proj/src/a.ts#class:A");
    let file_before = repo.node("proj/src/a.ts#file:a.ts");

    repo.analyze(&["src/b.ts", "src/a.ts"]).await;
    let second_stats = repo.store.statistics().unwrap();
    let class_after = repo.node("proj/src/a.ts#class:A");
    let file_after = repo.node("proj/src/a.ts#file:a.ts");

    assert_eq!(first_stats.nodes, second_stats.nodes);
    assert_eq!(first_stats.edges, second_stats.edges);
    assert_eq!(class_before.updated_at, class_after.updated_at);
    assert!(file_after.updated_at >= file_before.updated_at);
}

#[tokio::test]
async fn batch_reports_per_file_failures_without_aborting() {
    let repo = TestRepo::new();
    repo.write("good.ts", "export class Good {}\n");
    repo.write("bad.css", "body {}\n");

    let report = repo
        .coordinator
        .analyze_paths(
            vec!["good.ts".to_string(), "bad.css".to_string(), "missing.ts".to_string()],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed(), 2);
    let kinds: Vec<&str> = report.failures.iter().map(|f| f.kind.as_str()).collect();
    assert!(kinds.contains(&"unsupported_language"), "{kinds:?}");

    // The good file landed despite its neighbors.
    assert!(
        repo.store
            .find_nodes(&NodeFilter::by_source_file("good.ts"))
            .unwrap()
            .iter()
            .any(|n| n.kind == NodeKind::Class)
    );
}

#[tokio::test]
async fn directory_analysis_discovers_recognized_files() {
    let repo = TestRepo::new();
    repo.write("src/a.ts", "export class A {}\n");
    repo.write("src/b.py", "class B:\n    pass\n");
    repo.write("README.md", "# Lattice\n");
    repo.write("ignore.txt", "not source\n");

    let report = repo.coordinator.analyze_directory(CancellationToken::new()).await;

    let analyzed: Vec<&str> = report.succeeded.iter().map(|r| r.path.as_str()).collect();
    assert!(analyzed.contains(&"src/a.ts"));
    assert!(analyzed.contains(&"src/b.py"));
    assert!(analyzed.contains(&"README.md"));
    assert!(!analyzed.contains(&"ignore.txt"));
    assert!(report.failures.is_empty());
}

/// Paths that hop through a parent directory resolve to the right file.
#[tokio::test]
async fn parent_relative_imports_resolve() {
    let repo = TestRepo::new();
    repo.write("src/util/helper.ts", "export const help = 1;\n");
    repo.write("src/app/main.ts", "import { help } from '../util/helper';\n");

    repo.analyze(&["src/util/helper.ts", "src/app/main.ts"]).await;

    let main = repo.node("proj/src/app/main.ts#file:main.ts");
    let helper = repo.node("proj/src/util/helper.ts#file:helper.ts");
    let imports = repo
        .store
        .find_edges(&EdgeFilter {
            source: Some(main.id),
            edge_types: Some(vec![edge_types::IMPORTS_FILE.to_string()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].target, helper.id);
}
