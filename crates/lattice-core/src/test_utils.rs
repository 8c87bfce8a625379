//! Shared fixture builders used by unit and integration tests

use crate::identifier::NodeIdentifier;
use crate::model::{EdgeDraft, NodeKind, NodeRecord, SourceLocation};
use crate::registry::edge_types;
use crate::store::GraphStore;

pub const PROJECT: &str = "proj";

/// A file node record keyed to its own path.
pub fn file_record(path: &str) -> NodeRecord {
    let identifier = NodeIdentifier::file(PROJECT, path).unwrap();
    let name = identifier.name.clone();
    NodeRecord::new(identifier, NodeKind::File, name).with_source_file(path)
}

/// A declaration node record inside `path`.
pub fn member_record(path: &str, kind: NodeKind, name: &str) -> NodeRecord {
    let identifier = NodeIdentifier::member(PROJECT, path, kind, name).unwrap();
    NodeRecord::new(identifier, kind, name)
        .with_source_file(path)
        .with_location(SourceLocation {
            line: 1,
            column: 1,
            ..Default::default()
        })
}

/// An explicit `depends_on` edge between two file paths.
pub fn depends_edge(from: &str, to: &str) -> EdgeDraft {
    EdgeDraft::explicit(
        NodeIdentifier::file(PROJECT, from).unwrap(),
        NodeIdentifier::file(PROJECT, to).unwrap(),
        edge_types::DEPENDS_ON,
    )
}

/// An in-memory store pre-loaded with file nodes for `paths`.
pub fn store_with_files(paths: &[&str]) -> GraphStore {
    let store = GraphStore::in_memory().unwrap();
    for path in paths {
        store.upsert_node(&file_record(path)).unwrap();
    }
    store
}

/// An in-memory store with files `a.ts → b.ts → c.ts` linked by
/// `depends_on` edges.
pub fn store_with_chain() -> GraphStore {
    let store = store_with_files(&["a.ts", "b.ts", "c.ts"]);
    store.upsert_edge(&depends_edge("a.ts", "b.ts")).unwrap();
    store.upsert_edge(&depends_edge("b.ts", "c.ts")).unwrap();
    store
}
