//! Unit tests for lattice-infer

use std::sync::Arc;

use lattice_core::registry::{EdgeTypeSpec, edge_types, rules};
use lattice_core::store::{EdgeFilter, UnknownSymbolRecord};
use lattice_core::test_utils::*;
use lattice_core::{
    EdgeDraft, EdgeTypeRegistry, Error, GraphStore, NodeIdentifier, NodeKind,
};

use crate::batch::{InferenceJob, JobOutcome, run_batch};
use crate::engine::{ChangeEvent, HierarchicalOptions, InferenceEngine, TransitiveOptions};
use crate::resolver::{ResolverConfig, UnknownSymbolResolver, rules as match_rules};

fn engine_over(store: GraphStore) -> InferenceEngine {
    InferenceEngine::new(Arc::new(store), Arc::new(EdgeTypeRegistry::with_builtins()))
}

#[test]
fn transitive_query_returns_reachable_nodes_with_paths() {
    let engine = engine_over(store_with_chain());
    let a = engine
        .store()
        .get_node_by_identifier(&NodeIdentifier::file(PROJECT, "a.ts").unwrap())
        .unwrap()
        .unwrap();

    let result = engine
        .query_transitive(a.id, edge_types::DEPENDS_ON, TransitiveOptions::default())
        .unwrap();

    let names: Vec<&str> = result.targets.iter().map(|t| t.node.name.as_str()).collect();
    assert_eq!(names, vec!["b.ts", "c.ts"]);
    assert_eq!(result.targets[0].depth, 1);
    assert_eq!(result.targets[1].depth, 2);
    assert_eq!(result.targets[1].path.len(), 2, "two underlying edges");
    assert!(!result.cycle_detected);
    assert!(!result.truncated);
}

#[test]
fn transitive_query_respects_depth_budget() {
    let engine = engine_over(store_with_chain());
    let a = engine
        .store()
        .get_node_by_identifier(&NodeIdentifier::file(PROJECT, "a.ts").unwrap())
        .unwrap()
        .unwrap();

    let result = engine
        .query_transitive(
            a.id,
            edge_types::DEPENDS_ON,
            TransitiveOptions {
                max_depth: 1,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(result.targets.len(), 1);
    assert!(result.truncated, "c.ts lies beyond the depth budget");

    // max_depth = 0 means immediate successors, identical to 1.
    let zero = engine
        .query_transitive(
            a.id,
            edge_types::DEPENDS_ON,
            TransitiveOptions {
                max_depth: 0,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(zero.targets.len(), 1);
}

#[test]
fn transitive_query_detects_cycles_without_duplicates() {
    let store = store_with_files(&["a.ts", "b.ts", "c.ts"]);
    store.upsert_edge(&depends_edge("a.ts", "b.ts")).unwrap();
    store.upsert_edge(&depends_edge("b.ts", "c.ts")).unwrap();
    store.upsert_edge(&depends_edge("c.ts", "a.ts")).unwrap();
    let engine = engine_over(store);

    let a = engine
        .store()
        .get_node_by_identifier(&NodeIdentifier::file(PROJECT, "a.ts").unwrap())
        .unwrap()
        .unwrap();

    let result = engine
        .query_transitive(a.id, edge_types::DEPENDS_ON, TransitiveOptions::default())
        .unwrap();

    let names: Vec<&str> = result.targets.iter().map(|t| t.node.name.as_str()).collect();
    assert_eq!(names, vec!["b.ts", "c.ts"], "start node is not its own target");
    assert!(result.cycle_detected);
}

#[test]
fn diamond_is_not_reported_as_cycle() {
    let store = store_with_files(&["a.ts", "b.ts", "c.ts", "d.ts"]);
    store.upsert_edge(&depends_edge("a.ts", "b.ts")).unwrap();
    store.upsert_edge(&depends_edge("a.ts", "c.ts")).unwrap();
    store.upsert_edge(&depends_edge("b.ts", "d.ts")).unwrap();
    store.upsert_edge(&depends_edge("c.ts", "d.ts")).unwrap();
    let engine = engine_over(store);

    let a = engine
        .store()
        .get_node_by_identifier(&NodeIdentifier::file(PROJECT, "a.ts").unwrap())
        .unwrap()
        .unwrap();

    let result = engine
        .query_transitive(a.id, edge_types::DEPENDS_ON, TransitiveOptions::default())
        .unwrap();

    assert_eq!(result.targets.len(), 3, "d.ts appears once");
    assert!(!result.cycle_detected);
}

#[test]
fn transitive_query_follows_specialized_types() {
    let store = store_with_files(&["a.ts", "b.ts"]);
    store
        .upsert_edge(&EdgeDraft::explicit(
            NodeIdentifier::file(PROJECT, "a.ts").unwrap(),
            NodeIdentifier::file(PROJECT, "b.ts").unwrap(),
            edge_types::IMPORTS_FILE,
        ))
        .unwrap();
    let engine = engine_over(store);

    let a = engine
        .store()
        .get_node_by_identifier(&NodeIdentifier::file(PROJECT, "a.ts").unwrap())
        .unwrap()
        .unwrap();

    // imports_file specializes depends_on, so the parent-type query sees it.
    let result = engine
        .query_transitive(a.id, edge_types::DEPENDS_ON, TransitiveOptions::default())
        .unwrap();
    assert_eq!(result.targets.len(), 1);
    assert_eq!(result.targets[0].node.name, "b.ts");
}

#[test]
fn unknown_edge_type_is_an_error() {
    let engine = engine_over(store_with_chain());
    let err = engine
        .query_transitive(lattice_core::NodeId(1), "no_such_type", TransitiveOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEdgeType(_)));
}

#[test]
fn specialization_closure_exposes_implicit_parent_edges() {
    let store = store_with_files(&["index.ts", "helper.ts"]);
    store
        .upsert_edge(&EdgeDraft::explicit(
            NodeIdentifier::file(PROJECT, "index.ts").unwrap(),
            NodeIdentifier::file(PROJECT, "helper.ts").unwrap(),
            edge_types::RE_EXPORTS,
        ))
        .unwrap();
    let engine = engine_over(store);

    let index = engine
        .store()
        .get_node_by_identifier(&NodeIdentifier::file(PROJECT, "index.ts").unwrap())
        .unwrap()
        .unwrap();

    // Asking for the child type sees only the explicit edge.
    let child_view = engine
        .edges_with_specialization(index.id, edge_types::RE_EXPORTS)
        .unwrap();
    assert_eq!(child_view.len(), 1);
    assert!(child_view[0].rule.is_none());

    // Asking for the parent sees the implicit specialization edge.
    let parent_view = engine
        .edges_with_specialization(index.id, edge_types::DEPENDS_ON)
        .unwrap();
    assert_eq!(parent_view.len(), 1);
    assert_eq!(
        parent_view[0].rule.as_deref(),
        Some(rules::specialization_of(edge_types::RE_EXPORTS, edge_types::DEPENDS_ON).as_str())
    );
    assert!(parent_view[0].derived);
    assert!(parent_view[0].edge_id.is_none(), "implicit edges are not persisted");
}

/// Registry where `extends` is the hierarchy and `renders` inherits along it.
fn class_hierarchy_registry() -> EdgeTypeRegistry {
    let registry = EdgeTypeRegistry::new();
    registry
        .register(EdgeTypeSpec::new(edge_types::EXTENDS).hierarchical())
        .unwrap();
    registry
        .register(EdgeTypeSpec::new(edge_types::RENDERS).inheritable())
        .unwrap();
    registry
}

#[test]
fn hierarchical_query_inherits_ancestor_edges() {
    let store = GraphStore::in_memory().unwrap();
    store.upsert_node(&file_record("f.tsx")).unwrap();
    let base = member_record("f.tsx", NodeKind::Class, "Base");
    let derived = member_record("f.tsx", NodeKind::Class, "Derived");
    let widget = member_record("f.tsx", NodeKind::Class, "Widget");
    store.upsert_node(&base).unwrap();
    store.upsert_node(&derived).unwrap();
    store.upsert_node(&widget).unwrap();
    store
        .upsert_edge(&EdgeDraft::explicit(
            base.identifier.clone(),
            widget.identifier.clone(),
            edge_types::RENDERS,
        ))
        .unwrap();
    store
        .upsert_edge(&EdgeDraft::explicit(
            derived.identifier.clone(),
            base.identifier.clone(),
            edge_types::EXTENDS,
        ))
        .unwrap();

    let store = Arc::new(store);
    let engine = InferenceEngine::new(Arc::clone(&store), Arc::new(class_hierarchy_registry()));

    let derived_node = store.get_node_by_identifier(&derived.identifier).unwrap().unwrap();
    let result = engine
        .query_hierarchical(
            derived_node.id,
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
    assert_eq!(inherited[0].target.name, "Widget");

    // The inherited edge was materialized as a derived row.
    let derived_edges = store
        .find_edges(&EdgeFilter {
            source: Some(derived_node.id),
            edge_types: Some(vec![edge_types::RENDERS.to_string()]),
            derived: Some(true),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(derived_edges.len(), 1);
    assert_eq!(
        derived_edges[0].rule.as_deref(),
        Some(rules::INHERITED_VIA_HIERARCHY)
    );
}

#[test]
fn cache_serves_repeat_queries_and_invalidates_on_write() {
    let engine = engine_over(store_with_chain());
    let a = engine
        .store()
        .get_node_by_identifier(&NodeIdentifier::file(PROJECT, "a.ts").unwrap())
        .unwrap()
        .unwrap();

    let first = engine
        .query_transitive(a.id, edge_types::DEPENDS_ON, TransitiveOptions::default())
        .unwrap();
    let second = engine
        .query_transitive(a.id, edge_types::DEPENDS_ON, TransitiveOptions::default())
        .unwrap();
    assert_eq!(engine.cache_stats().hits, 1);

    // Cached result is identical to the fresh computation.
    let fresh: Vec<_> = first.targets.iter().map(|t| (t.node.id, t.depth, t.path.clone())).collect();
    let cached: Vec<_> = second.targets.iter().map(|t| (t.node.id, t.depth, t.path.clone())).collect();
    assert_eq!(fresh, cached);

    // A write to the edge type moves the generation; next read recomputes.
    engine
        .store()
        .upsert_node(&file_record("d.ts"))
        .unwrap();
    engine.store().upsert_edge(&depends_edge("c.ts", "d.ts")).unwrap();

    let third = engine
        .query_transitive(a.id, edge_types::DEPENDS_ON, TransitiveOptions::default())
        .unwrap();
    assert_eq!(third.targets.len(), 3, "recomputed against the new generation");
}

#[test]
fn process_change_notifies_subscribers_in_order() {
    let engine = engine_over(GraphStore::in_memory().unwrap());
    let mut rx = engine.subscribe();

    engine.process_change(ChangeEvent::EdgeWritten {
        edge_type: edge_types::DEPENDS_ON.to_string(),
    });
    engine.process_change(ChangeEvent::FileReplaced {
        path: "a.ts".to_string(),
    });

    assert_eq!(
        rx.try_recv().unwrap(),
        ChangeEvent::EdgeWritten {
            edge_type: edge_types::DEPENDS_ON.to_string()
        }
    );
    assert_eq!(
        rx.try_recv().unwrap(),
        ChangeEvent::FileReplaced {
            path: "a.ts".to_string()
        }
    );
}

#[tokio::test]
async fn batch_preserves_slots_and_isolates_failures() {
    let engine = Arc::new(engine_over(store_with_chain()));
    let a = engine
        .store()
        .get_node_by_identifier(&NodeIdentifier::file(PROJECT, "a.ts").unwrap())
        .unwrap()
        .unwrap();

    let jobs = vec![
        InferenceJob::Transitive {
            start: a.id,
            edge_type: edge_types::DEPENDS_ON.to_string(),
            options: TransitiveOptions::default(),
        },
        InferenceJob::Transitive {
            start: a.id,
            edge_type: "no_such_type".to_string(),
            options: TransitiveOptions::default(),
        },
        InferenceJob::Transitive {
            start: a.id,
            edge_type: edge_types::DEPENDS_ON.to_string(),
            options: TransitiveOptions {
                max_depth: 1,
                ..Default::default()
            },
        },
    ];

    let results = run_batch(
        engine,
        jobs,
        2,
        tokio_util::sync::CancellationToken::new(),
    )
    .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].index, 0);
    assert!(results[0].outcome.is_ok());
    assert!(matches!(
        results[1].outcome.as_ref().unwrap_err(),
        Error::UnknownEdgeType(_)
    ));
    match results[2].outcome.as_ref().unwrap() {
        JobOutcome::Transitive(r) => assert_eq!(r.targets.len(), 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

// ── Resolver ────────────────────────────────────────────────────────

fn unknown_user(store: &GraphStore) -> lattice_core::UnknownSymbol {
    let id = store
        .insert_unknown_symbol(&UnknownSymbolRecord {
            name: "User".into(),
            kind: NodeKind::Class,
            source_file: "types.ts".into(),
            line: 3,
            column: 10,
            is_imported: false,
            is_alias: false,
            confidence: 0.6,
        })
        .unwrap();
    store.get_unknown_symbol(id).unwrap().unwrap()
}

#[test]
fn exact_name_match_ranks_first() {
    let store = GraphStore::in_memory().unwrap();
    store.upsert_node(&file_record("models/User.ts")).unwrap();
    store
        .upsert_node(&member_record("models/User.ts", NodeKind::Class, "User"))
        .unwrap();
    store
        .upsert_node(&member_record("models/User.ts", NodeKind::Function, "user"))
        .unwrap();

    let store = Arc::new(store);
    let resolver = UnknownSymbolResolver::new(Arc::clone(&store));
    let unknown = unknown_user(&store);

    let candidates = resolver.find_candidates(&unknown).unwrap();
    assert!(!candidates.is_empty());
    assert_eq!(candidates[0].rule, match_rules::EXACT_NAME_MATCH);
    assert!(candidates[0].score >= 0.9);
    assert_eq!(candidates[0].node.name, "User");
}

#[test]
fn agreement_bonus_never_lowers_confidence() {
    let store = GraphStore::in_memory().unwrap();
    store.upsert_node(&file_record("types.ts")).unwrap();
    // Declared in the same file as the reference: exact + type + context
    // rules all agree.
    store
        .upsert_node(&member_record("types.ts", NodeKind::Class, "User"))
        .unwrap();

    let store = Arc::new(store);
    let resolver = UnknownSymbolResolver::new(Arc::clone(&store));
    let unknown = unknown_user(&store);

    let candidates = resolver.find_candidates(&unknown).unwrap();
    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert!(candidate.matched_rules.len() >= 3, "{:?}", candidate.matched_rules);
    assert!(
        candidate.score >= 0.9,
        "agreement adds to the max rule confidence"
    );
    assert!(candidate.score <= 1.0);
}

#[test]
fn batch_infer_applies_the_floor() {
    let store = GraphStore::in_memory().unwrap();
    store.upsert_node(&file_record("models/User.ts")).unwrap();
    // Case-only match: type_based_match at 0.75.
    store
        .upsert_node(&member_record("models/User.ts", NodeKind::Class, "user"))
        .unwrap();

    let store = Arc::new(store);
    let unknown = unknown_user(&store);

    let strict = UnknownSymbolResolver::new(Arc::clone(&store)).with_config(ResolverConfig {
        floor: 0.8,
        agreement_bonus: 0.05,
    });
    assert!(strict.batch_infer(&[unknown.clone()]).unwrap().is_empty());

    let lenient = UnknownSymbolResolver::new(Arc::clone(&store)).with_config(ResolverConfig {
        floor: 0.7,
        agreement_bonus: 0.05,
    });
    let relations = lenient.batch_infer(&[unknown]).unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].rule, match_rules::TYPE_BASED_MATCH);
}

#[test]
fn validated_equivalence_exposes_known_edges() {
    let store = GraphStore::in_memory().unwrap();
    store.upsert_node(&file_record("models/User.ts")).unwrap();
    store.upsert_node(&file_record("models/Role.ts")).unwrap();
    let user = member_record("models/User.ts", NodeKind::Class, "User");
    let role = member_record("models/Role.ts", NodeKind::Class, "Role");
    store.upsert_node(&user).unwrap();
    store.upsert_node(&role).unwrap();
    store
        .upsert_edge(&EdgeDraft::explicit(
            user.identifier.clone(),
            role.identifier.clone(),
            edge_types::REFERENCES,
        ))
        .unwrap();

    let store = Arc::new(store);
    let resolver = UnknownSymbolResolver::new(Arc::clone(&store));
    let unknown = unknown_user(&store);

    let candidates = resolver.find_candidates(&unknown).unwrap();
    let relation = resolver
        .create_equivalence(unknown.id, candidates[0].node.id, candidates[0].score, candidates[0].rule)
        .unwrap();

    // Before validation the pointer is inert.
    assert!(resolver.edges_for_unknown(unknown.id, true).unwrap().is_empty());

    assert!(resolver.validate(&relation).unwrap());
    let edges = resolver.edges_for_unknown(unknown.id, true).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].edge_type, edge_types::REFERENCES);

    // Opting out hides them.
    assert!(resolver.edges_for_unknown(unknown.id, false).unwrap().is_empty());
}

#[test]
fn validate_rejects_incompatible_kinds() {
    let store = GraphStore::in_memory().unwrap();
    store.upsert_node(&file_record("a.ts")).unwrap();
    let variable = member_record("a.ts", NodeKind::Variable, "User");
    let known = store.upsert_node(&variable).unwrap();

    let store = Arc::new(store);
    let resolver = UnknownSymbolResolver::new(Arc::clone(&store));
    let unknown = unknown_user(&store);

    let relation = resolver
        .create_equivalence(unknown.id, known, 0.5, match_rules::MANUAL)
        .unwrap();
    assert!(!resolver.validate(&relation).unwrap(), "class vs variable");
}

#[test]
fn search_unknowns_is_fuzzy_and_filtered() {
    let store = GraphStore::in_memory().unwrap();
    for (name, file) in [("UserService", "a.ts"), ("UserRepo", "b.ts"), ("Widget", "a.ts")] {
        store
            .insert_unknown_symbol(&UnknownSymbolRecord {
                name: name.into(),
                kind: NodeKind::Class,
                source_file: file.into(),
                line: 1,
                column: 1,
                is_imported: false,
                is_alias: false,
                confidence: 0.6,
            })
            .unwrap();
    }

    let store = Arc::new(store);
    let resolver = UnknownSymbolResolver::new(Arc::clone(&store));

    let hits = resolver
        .search_unknowns("usr", &Default::default())
        .unwrap();
    let names: Vec<&str> = hits.iter().map(|u| u.name.as_str()).collect();
    assert!(names.contains(&"UserService"));
    assert!(names.contains(&"UserRepo"));
    assert!(!names.contains(&"Widget"));

    let filtered = resolver
        .search_unknowns(
            "usr",
            &lattice_core::UnknownSymbolFilter {
                source_file: Some("a.ts".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].name, "UserService");
}
