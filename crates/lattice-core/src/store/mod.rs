//! SQLite-backed graph store
//!
//! Nodes and edges persist in an embedded database; writers are serialized
//! behind the connection mutex and every mutation runs inside a
//! transaction. Each committed write bumps a global generation counter and
//! a per-edge-type counter, which the inference cache reads to decide
//! whether a cached result is still current.

mod edges;
mod maintenance;
mod nodes;
mod schema;
mod symbols;

pub use edges::EdgeFilter;
pub use nodes::NodeFilter;
pub use symbols::{EquivalenceStatistics, UnknownSymbolFilter, UnknownSymbolRecord};

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use rusqlite::{Connection, Transaction};

use crate::error::{Error, Result};
use crate::identifier::NodeIdentifier;
use crate::model::{EdgeDraft, GraphEdge, GraphNode, NodeId, NodeRecord};

const MAX_TX_ATTEMPTS: u32 = 3;

/// Counts returned by [`GraphStore::statistics`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStatistics {
    pub nodes: u64,
    pub edges: u64,
    pub nodes_by_kind: Vec<(String, u64)>,
    pub edges_by_type: Vec<(String, u64)>,
    pub unknown_symbols: u64,
    pub equivalences: u64,
}

pub struct GraphStore {
    conn: Mutex<Connection>,
    in_memory: bool,
    generation: AtomicU64,
    type_generations: DashMap<String, u64>,
}

impl GraphStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, false)
    }

    /// A throwaway store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, true)
    }

    fn from_connection(conn: Connection, in_memory: bool) -> Result<Self> {
        schema::configure(&conn, in_memory)?;
        schema::initialize(&conn)?;
        conn.busy_timeout(Duration::from_millis(250))?;
        Ok(GraphStore {
            conn: Mutex::new(conn),
            in_memory,
            generation: AtomicU64::new(0),
            type_generations: DashMap::new(),
        })
    }

    /// Global write generation. Monotone; bumped on every committed write.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Write generation for one edge type.
    pub fn generation_for(&self, edge_type: &str) -> u64 {
        self.type_generations
            .get(edge_type)
            .map(|r| *r.value())
            .unwrap_or(0)
    }

    fn bump_generation<'a>(&self, touched_types: impl IntoIterator<Item = &'a str>) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        for edge_type in touched_types {
            self.type_generations.insert(edge_type.to_string(), generation);
        }
    }

    /// Run `f` inside a transaction; commits iff `f` returns `Ok`. Busy
    /// conflicts retry with backoff up to a bounded number of attempts.
    pub fn run_transaction<T>(
        &self,
        f: impl Fn(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            match f(&tx) {
                Ok(value) => match tx.commit() {
                    Ok(()) => return Ok(value),
                    Err(err) => {
                        let err = Error::from(err);
                        if err.is_retryable() && attempt < MAX_TX_ATTEMPTS {
                            drop(conn);
                            std::thread::sleep(Duration::from_millis(10 << attempt));
                            continue;
                        }
                        return Err(err);
                    }
                },
                Err(err) => {
                    drop(tx);
                    if err.is_retryable() && attempt < MAX_TX_ATTEMPTS {
                        drop(conn);
                        std::thread::sleep(Duration::from_millis(10 << attempt));
                        continue;
                    }
                    return Err(match err {
                        Error::Conflict { .. } => Error::Conflict { attempts: attempt },
                        other => other,
                    });
                }
            }
        }
    }

    /// Idempotent node upsert keyed by identifier. `updated_at` moves only
    /// when a mutable field actually changed.
    pub fn upsert_node(&self, record: &NodeRecord) -> Result<NodeId> {
        let id = self.run_transaction(|tx| nodes::upsert(tx, record))?;
        self.bump_generation(std::iter::empty::<&str>());
        Ok(id)
    }

    /// Idempotent edge upsert keyed by `(from, to, type, derived, rule)`.
    /// Endpoints must already exist.
    pub fn upsert_edge(&self, draft: &EdgeDraft) -> Result<crate::model::EdgeId> {
        let id = self.run_transaction(|tx| edges::upsert(tx, draft))?;
        self.bump_generation([draft.edge_type.as_str()]);
        Ok(id)
    }

    pub fn get_node(&self, id: NodeId) -> Result<Option<GraphNode>> {
        let conn = self.conn.lock().unwrap();
        nodes::get(&conn, id)
    }

    pub fn get_node_by_identifier(&self, identifier: &NodeIdentifier) -> Result<Option<GraphNode>> {
        let conn = self.conn.lock().unwrap();
        nodes::get_by_identifier(&conn, identifier)
    }

    pub fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<GraphNode>> {
        let conn = self.conn.lock().unwrap();
        nodes::find(&conn, filter)
    }

    pub fn find_edges(&self, filter: &EdgeFilter) -> Result<Vec<GraphEdge>> {
        let conn = self.conn.lock().unwrap();
        edges::find(&conn, filter)
    }

    pub fn get_edge(&self, id: crate::model::EdgeId) -> Result<Option<GraphEdge>> {
        let conn = self.conn.lock().unwrap();
        edges::get(&conn, id)
    }

    pub fn delete_edge(&self, id: crate::model::EdgeId) -> Result<bool> {
        let (deleted, edge_type) = self.run_transaction(|tx| {
            let edge = edges::get(tx, id)?;
            match edge {
                Some(edge) => {
                    tx.execute("DELETE FROM edges WHERE id = ?1", [id.0])?;
                    Ok((true, Some(edge.edge_type)))
                }
                None => Ok((false, None)),
            }
        })?;
        if let Some(edge_type) = edge_type {
            self.bump_generation([edge_type.as_str()]);
        }
        Ok(deleted)
    }

    /// Transactionally replace everything keyed to `path`.
    ///
    /// Nodes whose `source_file == path` but whose identifier is absent
    /// from `nodes` are deleted together with every edge touching them.
    /// All explicit edges out of the file's nodes are replaced by `edges`;
    /// derived edges touching the file's nodes are dropped and left to the
    /// inference engine to re-materialize. Unknown symbols of the file are
    /// removed. Nodes in `nodes` keyed to other files (referenced-file
    /// stubs) are only created when absent; their own analysis owns their
    /// fields.
    pub fn replace_file(
        &self,
        path: &str,
        nodes: &[NodeRecord],
        edges: &[EdgeDraft],
    ) -> Result<Vec<NodeId>> {
        let (ids, touched) = self.run_transaction(|tx| {
            let mut touched: HashSet<String> = HashSet::new();

            let old = nodes::ids_for_source_file(tx, path)?;
            let new_identifiers: HashSet<String> =
                nodes.iter().map(|n| n.identifier.to_string()).collect();

            // Edge types whose rows will disappear with the old nodes.
            for (_, id) in &old {
                for t in edges::types_touching(tx, *id)? {
                    touched.insert(t);
                }
            }

            // Drop nodes that did not survive; cascades take their edges.
            for (identifier, id) in &old {
                if !new_identifiers.contains(identifier) {
                    tx.execute("DELETE FROM nodes WHERE id = ?1", [id.0])?;
                }
            }

            let mut ids = Vec::with_capacity(nodes.len());
            let mut file_node: Option<NodeId> = None;
            for record in nodes {
                // Full upsert for the file's own nodes; stubs for foreign
                // endpoints only ensure the row exists.
                let owned = record.source_file.as_deref() == Some(path)
                    || record.source_file.is_none();
                let id = if owned {
                    nodes::upsert(tx, record)?
                } else {
                    nodes::ensure(tx, record)?
                };
                if record.source_file.as_deref() == Some(path)
                    && record.kind == crate::model::NodeKind::File
                {
                    file_node = Some(id);
                }
                ids.push(id);
            }

            // Survivors keep their rows but shed their outgoing explicit
            // edges and any derived edges touching them.
            let survivor_ids: Vec<NodeId> = nodes
                .iter()
                .zip(&ids)
                .filter(|(n, _)| n.source_file.as_deref() == Some(path))
                .map(|(_, id)| *id)
                .collect();
            for id in &survivor_ids {
                for t in edges::types_touching(tx, *id)? {
                    touched.insert(t);
                }
                tx.execute(
                    "DELETE FROM edges WHERE from_node_id = ?1 AND derived = 0",
                    [id.0],
                )?;
                tx.execute(
                    "DELETE FROM edges WHERE (from_node_id = ?1 OR to_node_id = ?1) AND derived = 1",
                    [id.0],
                )?;
            }

            for draft in edges {
                edges::upsert(tx, draft)?;
                touched.insert(draft.edge_type.clone());
            }

            // Re-analysis always marks the file node, even when nothing in
            // it changed.
            if let Some(id) = file_node {
                nodes::touch(tx, id)?;
            }

            symbols::delete_for_file(tx, path)?;

            Ok((ids, touched))
        })?;
        self.bump_generation(touched.iter().map(String::as_str));
        Ok(ids)
    }

    pub fn statistics(&self) -> Result<StoreStatistics> {
        let conn = self.conn.lock().unwrap();
        let count = |sql: &str| -> Result<u64> {
            Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as u64)
        };
        let grouped = |sql: &str| -> Result<Vec<(String, u64)>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        };
        Ok(StoreStatistics {
            nodes: count("SELECT COUNT(*) FROM nodes")?,
            edges: count("SELECT COUNT(*) FROM edges")?,
            nodes_by_kind: grouped("SELECT kind, COUNT(*) FROM nodes GROUP BY kind ORDER BY kind")?,
            edges_by_type: grouped("SELECT type, COUNT(*) FROM edges GROUP BY type ORDER BY type")?,
            unknown_symbols: count("SELECT COUNT(*) FROM unknown_symbols")?,
            equivalences: count("SELECT COUNT(*) FROM equivalences")?,
        })
    }

    // ── Unknown symbols & equivalences (C7 persistence) ─────────────

    pub fn insert_unknown_symbol(&self, record: &UnknownSymbolRecord) -> Result<i64> {
        let id = self.run_transaction(|tx| symbols::insert_unknown(tx, record))?;
        self.bump_generation(std::iter::empty::<&str>());
        Ok(id)
    }

    pub fn get_unknown_symbol(&self, id: i64) -> Result<Option<crate::model::UnknownSymbol>> {
        let conn = self.conn.lock().unwrap();
        symbols::get_unknown(&conn, id)
    }

    pub fn find_unknown_symbols(
        &self,
        filter: &UnknownSymbolFilter,
    ) -> Result<Vec<crate::model::UnknownSymbol>> {
        let conn = self.conn.lock().unwrap();
        symbols::find_unknowns(&conn, filter)
    }

    pub fn insert_equivalence(
        &self,
        unknown_id: i64,
        known_id: NodeId,
        rule: &str,
        confidence: f64,
    ) -> Result<crate::model::EquivalenceRelation> {
        let relation = self
            .run_transaction(|tx| symbols::insert_equivalence(tx, unknown_id, known_id, rule, confidence))?;
        self.bump_generation(std::iter::empty::<&str>());
        Ok(relation)
    }

    pub fn set_equivalence_validated(&self, id: i64, validated: bool) -> Result<()> {
        self.run_transaction(|tx| symbols::set_validated(tx, id, validated))?;
        self.bump_generation(std::iter::empty::<&str>());
        Ok(())
    }

    pub fn equivalences_for_unknown(
        &self,
        unknown_id: i64,
    ) -> Result<Vec<crate::model::EquivalenceRelation>> {
        let conn = self.conn.lock().unwrap();
        symbols::equivalences_for_unknown(&conn, unknown_id)
    }

    pub fn equivalence_statistics(&self) -> Result<EquivalenceStatistics> {
        let conn = self.conn.lock().unwrap();
        symbols::statistics(&conn)
    }

    // ── Maintenance ─────────────────────────────────────────────────

    /// Copy the database into `destination` (`VACUUM INTO`).
    pub fn backup(&self, destination: &Path) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        maintenance::backup(&conn, destination)
    }

    /// Truncate the WAL into the main database file.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        maintenance::checkpoint(&conn, self.in_memory)
    }

    /// Run the query-planner optimizer and reclaim free pages.
    pub fn optimize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        maintenance::optimize(&conn, self.in_memory)
    }
}

/// Node upsert usable inside a caller-managed [`GraphStore::run_transaction`].
pub fn tx_upsert_node(tx: &Transaction<'_>, record: &NodeRecord) -> Result<NodeId> {
    nodes::upsert(tx, record)
}

/// Edge upsert usable inside a caller-managed [`GraphStore::run_transaction`].
pub fn tx_upsert_edge(tx: &Transaction<'_>, draft: &EdgeDraft) -> Result<crate::model::EdgeId> {
    edges::upsert(tx, draft)
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("in_memory", &self.in_memory)
            .field("generation", &self.generation())
            .finish()
    }
}
