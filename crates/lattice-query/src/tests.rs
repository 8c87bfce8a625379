//! Unit tests for lattice-query

use std::sync::Arc;

use serde_json::json;

use lattice_core::registry::edge_types;
use lattice_core::test_utils::*;
use lattice_core::{GraphStore, NodeKind};

use crate::ast::{Condition, GraphQuery, Operator, OrderBy, QueryTarget, WhereClause};
use crate::exec::QueryExecutor;

fn seeded_executor() -> QueryExecutor {
    let store = GraphStore::in_memory().unwrap();
    store.upsert_node(&file_record("src/a.ts")).unwrap();
    store.upsert_node(&file_record("src/b.ts")).unwrap();
    store.upsert_node(&member_record("src/a.ts", NodeKind::Class, "UserService")).unwrap();
    store.upsert_node(&member_record("src/a.ts", NodeKind::Function, "loadUsers")).unwrap();
    store.upsert_node(&member_record("src/b.ts", NodeKind::Class, "Widget")).unwrap();
    store.upsert_edge(&depends_edge("src/a.ts", "src/b.ts")).unwrap();
    QueryExecutor::new(Arc::new(store))
}

fn eq(field: &str, value: serde_json::Value) -> WhereClause {
    WhereClause::Cond(Condition {
        field: field.to_string(),
        op: Operator::Eq,
        value: Some(value),
    })
}

#[test]
fn select_star_returns_full_rows() {
    let executor = seeded_executor();
    let rows = executor.run(&GraphQuery::nodes()).unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows[0].contains_key("identifier"));
    assert!(rows[0].contains_key("kind"));
}

#[test]
fn where_equality_filters() {
    let executor = seeded_executor();
    let query = GraphQuery {
        where_clause: Some(eq("kind", json!("class"))),
        ..GraphQuery::nodes()
    };
    let rows = executor.run(&query).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["kind"] == json!("class")));
}

#[test]
fn where_like_translates_sql_wildcards() {
    let executor = seeded_executor();
    let query = GraphQuery {
        where_clause: Some(WhereClause::Cond(Condition {
            field: "name".to_string(),
            op: Operator::Like,
            value: Some(json!("user%")),
        })),
        ..GraphQuery::nodes()
    };
    let rows = executor.run(&query).unwrap();
    assert_eq!(rows.len(), 1, "case-insensitive anchored match");
    assert_eq!(rows[0]["name"], json!("UserService"));
}

#[test]
fn where_in_and_not_in() {
    let executor = seeded_executor();
    let query = GraphQuery {
        where_clause: Some(WhereClause::Cond(Condition {
            field: "kind".to_string(),
            op: Operator::In,
            value: Some(json!(["class", "function"])),
        })),
        ..GraphQuery::nodes()
    };
    assert_eq!(executor.run(&query).unwrap().len(), 3);

    let query = GraphQuery {
        where_clause: Some(WhereClause::Cond(Condition {
            field: "kind".to_string(),
            op: Operator::NotIn,
            value: Some(json!(["file"])),
        })),
        ..GraphQuery::nodes()
    };
    assert_eq!(executor.run(&query).unwrap().len(), 3);
}

#[test]
fn exists_checks_field_presence() {
    let executor = seeded_executor();
    let query = GraphQuery {
        where_clause: Some(WhereClause::Cond(Condition {
            field: "location".to_string(),
            op: Operator::NotExists,
            value: None,
        })),
        ..GraphQuery::nodes()
    };
    // Rows carry no `location` column, so every row passes NOT_EXISTS.
    assert_eq!(executor.run(&query).unwrap().len(), 5);
}

#[test]
fn boolean_combinations() {
    let executor = seeded_executor();
    let query = GraphQuery {
        where_clause: Some(WhereClause::Any(vec![
            eq("name", json!("Widget")),
            WhereClause::All(vec![
                eq("kind", json!("function")),
                eq("source_file", json!("src/a.ts")),
            ]),
        ])),
        ..GraphQuery::nodes()
    };
    let rows = executor.run(&query).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn order_limit_offset() {
    let executor = seeded_executor();
    let query = GraphQuery {
        order_by: vec![OrderBy {
            field: "name".to_string(),
            descending: false,
        }],
        limit: Some(2),
        offset: Some(1),
        select: Some(vec!["name".to_string()]),
        ..GraphQuery::nodes()
    };
    let rows = executor.run(&query).unwrap();
    let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
    // Full name order: UserService, Widget, a.ts, b.ts, loadUsers.
    assert_eq!(names, vec!["Widget", "a.ts"]);
}

#[test]
fn group_by_with_having() {
    let executor = seeded_executor();
    let query = GraphQuery {
        group_by: Some(vec!["kind".to_string()]),
        having: Some(Condition {
            field: "count".to_string(),
            op: Operator::Ge,
            value: Some(json!(2)),
        }),
        ..GraphQuery::nodes()
    };
    let rows = executor.run(&query).unwrap();
    let kinds: Vec<&str> = rows.iter().filter_map(|r| r["kind"].as_str()).collect();
    assert_eq!(kinds, vec!["class", "file"]);
    assert!(rows.iter().all(|r| r["count"] == json!(2)));
}

#[test]
fn having_without_group_by_is_rejected() {
    let executor = seeded_executor();
    let query = GraphQuery {
        having: Some(Condition {
            field: "count".to_string(),
            op: Operator::Gt,
            value: Some(json!(1)),
        }),
        ..GraphQuery::nodes()
    };
    assert!(executor.run(&query).is_err());
}

#[test]
fn edge_queries_filter_by_type() {
    let executor = seeded_executor();
    let query = GraphQuery {
        where_clause: Some(eq("type", json!(edge_types::DEPENDS_ON))),
        ..GraphQuery::edges()
    };
    let rows = executor.run(&query).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["derived"], json!(false));
}

#[test]
fn metadata_paths_reach_into_the_object() {
    let store = GraphStore::in_memory().unwrap();
    store.upsert_node(&file_record("a.ts")).unwrap();
    store
        .upsert_node(
            &member_record("a.ts", NodeKind::Class, "A").with_metadata("namespace", "app"),
        )
        .unwrap();
    let executor = QueryExecutor::new(Arc::new(store));

    let query = GraphQuery {
        where_clause: Some(eq("metadata.namespace", json!("app"))),
        ..GraphQuery::nodes()
    };
    let rows = executor.run(&query).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("A"));
}

#[test]
fn query_round_trips_through_json() {
    let query = GraphQuery {
        target: QueryTarget::Nodes,
        select: Some(vec!["name".into()]),
        where_clause: Some(WhereClause::All(vec![
            eq("kind", json!("class")),
            WhereClause::Cond(Condition {
                field: "name".into(),
                op: Operator::Like,
                value: Some(json!("User%")),
            }),
        ])),
        group_by: None,
        having: None,
        order_by: vec![OrderBy {
            field: "name".into(),
            descending: true,
        }],
        limit: Some(10),
        offset: None,
    };
    let raw = serde_json::to_string(&query).unwrap();
    let parsed: GraphQuery = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed, query);
}
