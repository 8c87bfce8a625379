//! Node rows

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use crate::error::{Error, Result};
use crate::identifier::NodeIdentifier;
use crate::model::{GraphNode, Language, Metadata, NodeId, NodeKind, NodeRecord, SourceLocation};

/// Selectors for [`crate::store::GraphStore::find_nodes`]. Empty filter
/// matches everything.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub identifier: Option<String>,
    pub source_files: Option<Vec<String>>,
    pub kinds: Option<Vec<NodeKind>>,
    pub language: Option<Language>,
    /// Matches nodes whose metadata object contains this key.
    pub metadata_key: Option<String>,
    pub name: Option<String>,
    /// Case-insensitive name equality.
    pub name_ci: Option<String>,
    pub limit: Option<u32>,
}

impl NodeFilter {
    pub fn by_identifier(identifier: &NodeIdentifier) -> Self {
        NodeFilter {
            identifier: Some(identifier.to_string()),
            ..Default::default()
        }
    }

    pub fn by_source_file(path: &str) -> Self {
        NodeFilter {
            source_files: Some(vec![path.to_string()]),
            ..Default::default()
        }
    }

    pub fn by_kind(kind: NodeKind) -> Self {
        NodeFilter {
            kinds: Some(vec![kind]),
            ..Default::default()
        }
    }

    pub fn by_name(name: &str) -> Self {
        NodeFilter {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }
}

pub(super) fn upsert(conn: &Connection, record: &NodeRecord) -> Result<NodeId> {
    let identifier = record.identifier.to_string();
    let existing = get_by_identifier(conn, &record.identifier)?;
    let now = Utc::now();

    match existing {
        Some(node) => {
            let unchanged = node.kind == record.kind
                && node.name == record.name
                && node.source_file == record.source_file
                && node.language == record.language
                && node.location == record.location
                && node.metadata == record.metadata;
            if !unchanged {
                conn.execute(
                    "UPDATE nodes SET kind = ?1, name = ?2, source_file = ?3, language = ?4,
                     location_json = ?5, metadata_json = ?6, updated_at = ?7
                     WHERE id = ?8",
                    rusqlite::params![
                        record.kind.as_str(),
                        record.name,
                        record.source_file,
                        record.language.map(|l| l.as_str()),
                        location_json(record.location.as_ref())?,
                        metadata_json(&record.metadata)?,
                        now.to_rfc3339(),
                        node.id.0,
                    ],
                )?;
            }
            Ok(node.id)
        }
        None => {
            conn.execute(
                "INSERT INTO nodes (identifier, kind, name, source_file, language,
                 location_json, metadata_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    identifier,
                    record.kind.as_str(),
                    record.name,
                    record.source_file,
                    record.language.map(|l| l.as_str()),
                    location_json(record.location.as_ref())?,
                    metadata_json(&record.metadata)?,
                    now.to_rfc3339(),
                ],
            )?;
            Ok(NodeId(conn.last_insert_rowid()))
        }
    }
}

/// Insert-if-absent: stub records for nodes owned by other files must not
/// overwrite what their own analysis wrote.
pub(super) fn ensure(conn: &Connection, record: &NodeRecord) -> Result<NodeId> {
    match get_by_identifier(conn, &record.identifier)? {
        Some(node) => Ok(node.id),
        None => upsert(conn, record),
    }
}

/// Bump `updated_at` without changing fields.
pub(super) fn touch(conn: &Connection, id: NodeId) -> Result<()> {
    conn.execute(
        "UPDATE nodes SET updated_at = ?1 WHERE id = ?2",
        rusqlite::params![Utc::now().to_rfc3339(), id.0],
    )?;
    Ok(())
}

pub(super) fn get(conn: &Connection, id: NodeId) -> Result<Option<GraphNode>> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_NODE} WHERE id = ?1"))?;
    let mut rows = stmt.query([id.0])?;
    match rows.next()? {
        Some(row) => Ok(Some(node_from_row(row)?)),
        None => Ok(None),
    }
}

pub(super) fn get_by_identifier(
    conn: &Connection,
    identifier: &NodeIdentifier,
) -> Result<Option<GraphNode>> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_NODE} WHERE identifier = ?1"))?;
    let mut rows = stmt.query([identifier.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(node_from_row(row)?)),
        None => Ok(None),
    }
}

/// `(identifier, id)` pairs of all nodes keyed to `path`.
pub(super) fn ids_for_source_file(
    conn: &Connection,
    path: &str,
) -> Result<Vec<(String, NodeId)>> {
    let mut stmt =
        conn.prepare_cached("SELECT identifier, id FROM nodes WHERE source_file = ?1")?;
    let rows = stmt
        .query_map([path], |row| {
            Ok((row.get::<_, String>(0)?, NodeId(row.get::<_, i64>(1)?)))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(super) fn find(conn: &Connection, filter: &NodeFilter) -> Result<Vec<GraphNode>> {
    let mut sql = String::from(SELECT_NODE);
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(identifier) = &filter.identifier {
        params.push(Value::from(identifier.clone()));
        clauses.push(format!("identifier = ?{}", params.len()));
    }
    if let Some(files) = &filter.source_files {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = files
            .iter()
            .map(|f| {
                params.push(Value::from(f.clone()));
                format!("?{}", params.len())
            })
            .collect();
        clauses.push(format!("source_file IN ({})", placeholders.join(", ")));
    }
    if let Some(kinds) = &filter.kinds {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = kinds
            .iter()
            .map(|k| {
                params.push(Value::from(k.as_str().to_string()));
                format!("?{}", params.len())
            })
            .collect();
        clauses.push(format!("kind IN ({})", placeholders.join(", ")));
    }
    if let Some(language) = filter.language {
        params.push(Value::from(language.as_str().to_string()));
        clauses.push(format!("language = ?{}", params.len()));
    }
    if let Some(key) = &filter.metadata_key {
        params.push(Value::from(format!("$.{key}")));
        clauses.push(format!("json_extract(metadata_json, ?{}) IS NOT NULL", params.len()));
    }
    if let Some(name) = &filter.name {
        params.push(Value::from(name.clone()));
        clauses.push(format!("name = ?{}", params.len()));
    }
    if let Some(name) = &filter.name_ci {
        params.push(Value::from(name.to_lowercase()));
        clauses.push(format!("LOWER(name) = ?{}", params.len()));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY identifier");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
    let mut nodes = Vec::new();
    while let Some(row) = rows.next()? {
        nodes.push(node_from_row(row)?);
    }
    Ok(nodes)
}

const SELECT_NODE: &str = "SELECT id, identifier, kind, name, source_file, language, \
                           location_json, metadata_json, created_at, updated_at FROM nodes";

fn node_from_row(row: &Row<'_>) -> Result<GraphNode> {
    let identifier: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let language: Option<String> = row.get(5)?;
    let location_json: Option<String> = row.get(6)?;
    let metadata_json: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(GraphNode {
        id: NodeId(row.get(0)?),
        identifier: identifier.parse()?,
        kind: NodeKind::parse(&kind)
            .ok_or_else(|| Error::ConstraintViolation(format!("unknown node kind '{kind}'")))?,
        name: row.get(3)?,
        source_file: row.get(4)?,
        language: language.as_deref().and_then(Language::parse),
        location: parse_location(location_json.as_deref())?,
        metadata: parse_metadata(&metadata_json)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn location_json(location: Option<&SourceLocation>) -> Result<Option<String>> {
    location
        .map(|loc| {
            serde_json::to_string(loc).map_err(|e| Error::Storage {
                category: crate::error::SqlCategory::Write,
                message: format!("location serialization: {e}"),
            })
        })
        .transpose()
}

fn parse_location(json: Option<&str>) -> Result<Option<SourceLocation>> {
    json.map(|j| {
        serde_json::from_str(j).map_err(|e| Error::Storage {
            category: crate::error::SqlCategory::Read,
            message: format!("location deserialization: {e}"),
        })
    })
    .transpose()
}

pub(super) fn metadata_json(metadata: &Metadata) -> Result<String> {
    serde_json::to_string(metadata).map_err(|e| Error::Storage {
        category: crate::error::SqlCategory::Write,
        message: format!("metadata serialization: {e}"),
    })
}

pub(super) fn parse_metadata(json: &str) -> Result<Metadata> {
    serde_json::from_str(json).map_err(|e| Error::Storage {
        category: crate::error::SqlCategory::Read,
        message: format!("metadata deserialization: {e}"),
    })
}

pub(super) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage {
            category: crate::error::SqlCategory::Read,
            message: format!("timestamp parse: {e}"),
        })
}
