//! Store maintenance operations

use std::path::Path;

use rusqlite::Connection;

use crate::error::{Error, Result, SqlCategory};

/// `VACUUM INTO` a fresh copy of the database at `destination`.
pub(super) fn backup(conn: &Connection, destination: &Path) -> Result<()> {
    let dest = destination.to_str().ok_or_else(|| Error::Storage {
        category: SqlCategory::Maintenance,
        message: format!("non-UTF-8 backup path: {}", destination.display()),
    })?;
    conn.execute("VACUUM INTO ?1", [dest])?;
    tracing::info!(destination = %destination.display(), "store backup written");
    Ok(())
}

pub(super) fn checkpoint(conn: &Connection, in_memory: bool) -> Result<()> {
    if in_memory {
        return Ok(());
    }
    // wal_checkpoint returns a result row, so it cannot go through
    // pragma_update.
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    Ok(())
}

pub(super) fn optimize(conn: &Connection, in_memory: bool) -> Result<()> {
    conn.execute_batch("PRAGMA optimize;")?;
    if !in_memory {
        conn.execute_batch("PRAGMA incremental_vacuum;")?;
    }
    Ok(())
}
