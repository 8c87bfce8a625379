//! Error taxonomy shared across the workspace

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad category of the SQL statement that failed, for `Storage` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlCategory {
    Read,
    Write,
    Schema,
    Maintenance,
}

impl std::fmt::Display for SqlCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SqlCategory::Read => "read",
            SqlCategory::Write => "write",
            SqlCategory::Schema => "schema",
            SqlCategory::Maintenance => "maintenance",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported language: {path}")]
    UnsupportedLanguage { path: String },

    #[error("parse failure in {language} at byte {offset}: {message}")]
    ParseFailure {
        language: String,
        offset: usize,
        message: String,
    },

    #[error("file exceeds size limit ({size} > {limit} bytes): {path}")]
    OversizeFile {
        path: String,
        size: u64,
        limit: u64,
    },

    #[error("storage failure ({category}): {message}")]
    Storage {
        category: SqlCategory,
        message: String,
    },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("unknown edge type: {0}")]
    UnknownEdgeType(String),

    #[error("edge type '{0}' re-registered with a conflicting spec")]
    EdgeTypeConflict(String),

    #[error("inference budget exceeded: {0}")]
    InferenceBudgetExceeded(String),

    #[error("cancelled")]
    Cancelled,

    #[error("transaction conflict after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("invalid node identifier '{input}': {reason}")]
    InvalidIdentifier { input: String, reason: String },

    #[error("node not found: {0}")]
    NodeNotFound(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::ConstraintViolation => Error::ConstraintViolation(err.to_string()),
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    Error::Conflict { attempts: 1 }
                }
                _ => Error::Storage {
                    category: SqlCategory::Write,
                    message: err.to_string(),
                },
            },
            _ => Error::Storage {
                category: SqlCategory::Read,
                message: err.to_string(),
            },
        }
    }
}

impl Error {
    /// Whether a bounded retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Stable machine-readable kind, used in batch reports and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnsupportedLanguage { .. } => "unsupported_language",
            Error::ParseFailure { .. } => "parse_failure",
            Error::OversizeFile { .. } => "oversize_file",
            Error::Storage { .. } => "storage_failure",
            Error::ConstraintViolation(_) => "constraint_violation",
            Error::UnknownEdgeType(_) => "unknown_edge_type",
            Error::EdgeTypeConflict(_) => "edge_type_conflict",
            Error::InferenceBudgetExceeded(_) => "inference_budget_exceeded",
            Error::Cancelled => "cancelled",
            Error::Conflict { .. } => "conflict",
            Error::InvalidIdentifier { .. } => "invalid_identifier",
            Error::NodeNotFound(_) => "node_not_found",
        }
    }
}
