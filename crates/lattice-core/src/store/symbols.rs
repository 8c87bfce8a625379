//! Unknown symbol and equivalence rows

use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use crate::error::{Error, Result};
use crate::model::{EquivalenceRelation, NodeId, NodeKind, UnknownSymbol};

/// An unknown symbol as handed to the store, before a row id exists.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownSymbolRecord {
    pub name: String,
    pub kind: NodeKind,
    pub source_file: String,
    pub line: u32,
    pub column: u32,
    pub is_imported: bool,
    pub is_alias: bool,
    pub confidence: f64,
}

/// Selectors for unknown-symbol queries.
#[derive(Debug, Clone, Default)]
pub struct UnknownSymbolFilter {
    pub name: Option<String>,
    pub kind: Option<NodeKind>,
    pub source_file: Option<String>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EquivalenceStatistics {
    pub total_unknowns: u64,
    pub total_equivalences: u64,
    pub validated: u64,
    pub by_rule: Vec<(String, u64)>,
    pub unknowns_by_kind: Vec<(String, u64)>,
    pub unknowns_by_file: Vec<(String, u64)>,
}

/// Idempotent on `(name, source_file, line, column)`; re-registration
/// keeps the higher confidence.
pub(super) fn insert_unknown(conn: &Connection, record: &UnknownSymbolRecord) -> Result<i64> {
    let existing: Option<(i64, f64)> = conn
        .query_row(
            "SELECT id, confidence FROM unknown_symbols
             WHERE name = ?1 AND source_file = ?2 AND line = ?3 AND \"column\" = ?4",
            rusqlite::params![record.name, record.source_file, record.line, record.column],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    if let Some((id, confidence)) = existing {
        if record.confidence > confidence {
            conn.execute(
                "UPDATE unknown_symbols SET confidence = ?1, kind = ?2 WHERE id = ?3",
                rusqlite::params![record.confidence, record.kind.as_str(), id],
            )?;
        }
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO unknown_symbols (name, kind, source_file, line, \"column\", is_imported, is_alias, confidence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            record.name,
            record.kind.as_str(),
            record.source_file,
            record.line,
            record.column,
            record.is_imported,
            record.is_alias,
            record.confidence,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn get_unknown(conn: &Connection, id: i64) -> Result<Option<UnknownSymbol>> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_UNKNOWN} WHERE id = ?1"))?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => Ok(Some(unknown_from_row(row)?)),
        None => Ok(None),
    }
}

pub(super) fn find_unknowns(
    conn: &Connection,
    filter: &UnknownSymbolFilter,
) -> Result<Vec<UnknownSymbol>> {
    let mut sql = String::from(SELECT_UNKNOWN);
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(name) = &filter.name {
        params.push(Value::from(name.clone()));
        clauses.push(format!("name = ?{}", params.len()));
    }
    if let Some(kind) = filter.kind {
        params.push(Value::from(kind.as_str().to_string()));
        clauses.push(format!("kind = ?{}", params.len()));
    }
    if let Some(file) = &filter.source_file {
        params.push(Value::from(file.clone()));
        clauses.push(format!("source_file = ?{}", params.len()));
    }
    if let Some(min) = filter.min_confidence {
        params.push(Value::from(min));
        clauses.push(format!("confidence >= ?{}", params.len()));
    }
    if let Some(max) = filter.max_confidence {
        params.push(Value::from(max));
        clauses.push(format!("confidence <= ?{}", params.len()));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY name, source_file, line");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
    let mut symbols = Vec::new();
    while let Some(row) = rows.next()? {
        symbols.push(unknown_from_row(row)?);
    }
    Ok(symbols)
}

pub(super) fn delete_for_file(conn: &Connection, path: &str) -> Result<()> {
    conn.execute("DELETE FROM unknown_symbols WHERE source_file = ?1", [path])?;
    Ok(())
}

pub(super) fn insert_equivalence(
    conn: &Connection,
    unknown_id: i64,
    known_id: NodeId,
    rule: &str,
    confidence: f64,
) -> Result<EquivalenceRelation> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM equivalences WHERE unknown_id = ?1 AND known_id = ?2 AND rule = ?3",
            rusqlite::params![unknown_id, known_id.0, rule],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    let id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE equivalences SET confidence = MAX(confidence, ?1) WHERE id = ?2",
                rusqlite::params![confidence, id],
            )?;
            id
        }
        None => {
            conn.execute(
                "INSERT INTO equivalences (unknown_id, known_id, rule, confidence, validated)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                rusqlite::params![unknown_id, known_id.0, rule, confidence],
            )?;
            conn.last_insert_rowid()
        }
    };

    let mut stmt = conn.prepare_cached(&format!("{SELECT_EQUIVALENCE} WHERE id = ?1"))?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => equivalence_from_row(row),
        None => Err(Error::ConstraintViolation(
            "equivalence row vanished mid-transaction".into(),
        )),
    }
}

pub(super) fn set_validated(conn: &Connection, id: i64, validated: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE equivalences SET validated = ?1 WHERE id = ?2",
        rusqlite::params![validated, id],
    )?;
    if changed == 0 {
        return Err(Error::NodeNotFound(format!("equivalence {id}")));
    }
    Ok(())
}

pub(super) fn equivalences_for_unknown(
    conn: &Connection,
    unknown_id: i64,
) -> Result<Vec<EquivalenceRelation>> {
    let mut stmt = conn.prepare_cached(&format!(
        "{SELECT_EQUIVALENCE} WHERE unknown_id = ?1 ORDER BY confidence DESC"
    ))?;
    let mut rows = stmt.query([unknown_id])?;
    let mut relations = Vec::new();
    while let Some(row) = rows.next()? {
        relations.push(equivalence_from_row(row)?);
    }
    Ok(relations)
}

pub(super) fn statistics(conn: &Connection) -> Result<EquivalenceStatistics> {
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
    Ok(EquivalenceStatistics {
        total_unknowns: count("SELECT COUNT(*) FROM unknown_symbols")?,
        total_equivalences: count("SELECT COUNT(*) FROM equivalences")?,
        validated: count("SELECT COUNT(*) FROM equivalences WHERE validated = 1")?,
        by_rule: grouped("SELECT rule, COUNT(*) FROM equivalences GROUP BY rule ORDER BY rule")?,
        unknowns_by_kind: grouped(
            "SELECT kind, COUNT(*) FROM unknown_symbols GROUP BY kind ORDER BY kind",
        )?,
        unknowns_by_file: grouped(
            "SELECT source_file, COUNT(*) FROM unknown_symbols GROUP BY source_file ORDER BY source_file",
        )?,
    })
}

const SELECT_UNKNOWN: &str = "SELECT id, name, kind, source_file, line, \"column\", \
                              is_imported, is_alias, confidence FROM unknown_symbols";

const SELECT_EQUIVALENCE: &str =
    "SELECT id, unknown_id, known_id, rule, confidence, validated FROM equivalences";

fn unknown_from_row(row: &Row<'_>) -> Result<UnknownSymbol> {
    let kind: String = row.get(2)?;
    Ok(UnknownSymbol {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: NodeKind::parse(&kind)
            .ok_or_else(|| Error::ConstraintViolation(format!("unknown symbol kind '{kind}'")))?,
        source_file: row.get(3)?,
        line: row.get(4)?,
        column: row.get(5)?,
        is_imported: row.get(6)?,
        is_alias: row.get(7)?,
        confidence: row.get(8)?,
    })
}

fn equivalence_from_row(row: &Row<'_>) -> Result<EquivalenceRelation> {
    Ok(EquivalenceRelation {
        id: row.get(0)?,
        unknown_id: row.get(1)?,
        known_id: NodeId(row.get(2)?),
        rule: row.get(3)?,
        confidence: row.get(4)?,
        validated: row.get(5)?,
    })
}
