//! Graph store schema and pragma tuning

use rusqlite::Connection;

use crate::error::Result;

/// Bumped whenever the schema changes incompatibly.
pub const SCHEMA_VERSION: i32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id            INTEGER PRIMARY KEY,
    identifier    TEXT NOT NULL UNIQUE,
    kind          TEXT NOT NULL,
    name          TEXT NOT NULL,
    source_file   TEXT,
    language      TEXT,
    location_json TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS edges (
    id            INTEGER PRIMARY KEY,
    from_node_id  INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    to_node_id    INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    type          TEXT NOT NULL,
    derived       INTEGER NOT NULL DEFAULT 0,
    rule          TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at    TEXT NOT NULL,
    UNIQUE (from_node_id, to_node_id, type, derived, rule)
);

CREATE TABLE IF NOT EXISTS unknown_symbols (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    source_file TEXT NOT NULL,
    line        INTEGER NOT NULL,
    "column"    INTEGER NOT NULL,
    is_imported INTEGER NOT NULL DEFAULT 0,
    is_alias    INTEGER NOT NULL DEFAULT 0,
    confidence  REAL NOT NULL DEFAULT 0.5,
    UNIQUE (name, source_file, line, "column")
);

CREATE TABLE IF NOT EXISTS equivalences (
    id         INTEGER PRIMARY KEY,
    unknown_id INTEGER NOT NULL REFERENCES unknown_symbols(id) ON DELETE CASCADE,
    known_id   INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    rule       TEXT NOT NULL,
    confidence REAL NOT NULL,
    validated  INTEGER NOT NULL DEFAULT 0,
    UNIQUE (unknown_id, known_id, rule)
);

CREATE INDEX IF NOT EXISTS idx_nodes_source_file ON nodes (source_file);
CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes (kind);
CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes (name);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges (type);
CREATE INDEX IF NOT EXISTS idx_edges_from_type ON edges (from_node_id, type);
CREATE INDEX IF NOT EXISTS idx_edges_to_type ON edges (to_node_id, type);
CREATE INDEX IF NOT EXISTS idx_nodes_type_updated ON nodes (kind, updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_unknowns_file ON unknown_symbols (source_file);
CREATE INDEX IF NOT EXISTS idx_unknowns_name ON unknown_symbols (name);
CREATE INDEX IF NOT EXISTS idx_equivalences_unknown ON equivalences (unknown_id);
"#;

/// Apply journaling and throughput pragmas. Durability pragmas are skipped
/// for in-memory connections.
pub fn configure(conn: &Connection, in_memory: bool) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    if !in_memory {
        // journal_mode reports the resulting mode as a row.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "auto_vacuum", "INCREMENTAL")?;
    }
    Ok(())
}

pub fn initialize(conn: &Connection) -> Result<()> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(crate::error::Error::Storage {
            category: crate::error::SqlCategory::Schema,
            message: format!("database schema version {version} is newer than supported {SCHEMA_VERSION}"),
        });
    }
    conn.execute_batch(CREATE_TABLES)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
