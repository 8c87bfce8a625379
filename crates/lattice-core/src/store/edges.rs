//! Edge rows

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use super::nodes;
use crate::error::{Error, Result};
use crate::model::{EdgeDraft, EdgeId, GraphEdge, NodeId};

/// Selectors for [`crate::store::GraphStore::find_edges`]. Empty filter
/// matches everything.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub source: Option<NodeId>,
    pub target: Option<NodeId>,
    pub edge_types: Option<Vec<String>>,
    pub derived: Option<bool>,
    pub rule: Option<String>,
    pub limit: Option<u32>,
}

impl EdgeFilter {
    pub fn by_type(edge_type: &str) -> Self {
        EdgeFilter {
            edge_types: Some(vec![edge_type.to_string()]),
            ..Default::default()
        }
    }

    pub fn outgoing(source: NodeId, edge_type: &str) -> Self {
        EdgeFilter {
            source: Some(source),
            edge_types: Some(vec![edge_type.to_string()]),
            ..Default::default()
        }
    }

    pub fn explicit_only(mut self) -> Self {
        self.derived = Some(false);
        self
    }
}

pub(super) fn upsert(conn: &Connection, draft: &EdgeDraft) -> Result<EdgeId> {
    let from = resolve_endpoint(conn, draft, &draft.source)?;
    let to = resolve_endpoint(conn, draft, &draft.target)?;

    if draft.derived && draft.rule.is_none() {
        return Err(Error::ConstraintViolation(format!(
            "derived edge {} -> {} of type {} cites no rule",
            draft.source, draft.target, draft.edge_type
        )));
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM edges WHERE from_node_id = ?1 AND to_node_id = ?2 AND type = ?3
             AND derived = ?4 AND rule IS ?5",
            rusqlite::params![from.0, to.0, draft.edge_type, draft.derived, draft.rule],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE edges SET metadata_json = ?1 WHERE id = ?2",
            rusqlite::params![nodes::metadata_json(&draft.metadata)?, id],
        )?;
        return Ok(EdgeId(id));
    }

    conn.execute(
        "INSERT INTO edges (from_node_id, to_node_id, type, derived, rule, metadata_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            from.0,
            to.0,
            draft.edge_type,
            draft.derived,
            draft.rule,
            nodes::metadata_json(&draft.metadata)?,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(EdgeId(conn.last_insert_rowid()))
}

fn resolve_endpoint(
    conn: &Connection,
    draft: &EdgeDraft,
    identifier: &crate::identifier::NodeIdentifier,
) -> Result<NodeId> {
    nodes::get_by_identifier(conn, identifier)?
        .map(|n| n.id)
        .ok_or_else(|| {
            Error::ConstraintViolation(format!(
                "edge of type {} references missing node {identifier}",
                draft.edge_type
            ))
        })
}

pub(super) fn get(conn: &Connection, id: EdgeId) -> Result<Option<GraphEdge>> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_EDGE} WHERE id = ?1"))?;
    let mut rows = stmt.query([id.0])?;
    match rows.next()? {
        Some(row) => Ok(Some(edge_from_row(row)?)),
        None => Ok(None),
    }
}

/// Distinct edge types with at least one edge touching `node`.
pub(super) fn types_touching(conn: &Connection, node: NodeId) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT type FROM edges WHERE from_node_id = ?1 OR to_node_id = ?1",
    )?;
    let rows = stmt
        .query_map([node.0], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(super) fn find(conn: &Connection, filter: &EdgeFilter) -> Result<Vec<GraphEdge>> {
    let mut sql = String::from(SELECT_EDGE);
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(source) = filter.source {
        params.push(Value::from(source.0));
        clauses.push(format!("from_node_id = ?{}", params.len()));
    }
    if let Some(target) = filter.target {
        params.push(Value::from(target.0));
        clauses.push(format!("to_node_id = ?{}", params.len()));
    }
    if let Some(types) = &filter.edge_types {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = types
            .iter()
            .map(|t| {
                params.push(Value::from(t.clone()));
                format!("?{}", params.len())
            })
            .collect();
        clauses.push(format!("type IN ({})", placeholders.join(", ")));
    }
    if let Some(derived) = filter.derived {
        params.push(Value::from(derived));
        clauses.push(format!("derived = ?{}", params.len()));
    }
    if let Some(rule) = &filter.rule {
        params.push(Value::from(rule.clone()));
        clauses.push(format!("rule = ?{}", params.len()));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY id");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
    let mut edges = Vec::new();
    while let Some(row) = rows.next()? {
        edges.push(edge_from_row(row)?);
    }
    Ok(edges)
}

const SELECT_EDGE: &str = "SELECT id, from_node_id, to_node_id, type, derived, rule, \
                           metadata_json, created_at FROM edges";

fn edge_from_row(row: &Row<'_>) -> Result<GraphEdge> {
    let metadata_json: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok(GraphEdge {
        id: EdgeId(row.get(0)?),
        source: NodeId(row.get(1)?),
        target: NodeId(row.get(2)?),
        edge_type: row.get(3)?,
        derived: row.get(4)?,
        rule: row.get(5)?,
        metadata: nodes::parse_metadata(&metadata_json)?,
        created_at: nodes::parse_timestamp(&created_at)?,
    })
}
