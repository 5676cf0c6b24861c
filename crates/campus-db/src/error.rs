//! Error types for the database layer.

use campus_types::Privilege;
use thiserror::Error;

/// Boxed error produced by a [`crate::MutationObserver`].
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by schema, fixture, query, and mutation operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// A table definition is invalid (unknown FK target, cycle, bad column).
    #[error("invalid schema definition: {0}")]
    Definition(String),

    /// A managed table already exists and the re-run policy forbids dropping it.
    #[error("table '{0}' already exists")]
    AlreadyExists(String),

    /// A row violated a PRIMARY KEY, FOREIGN KEY, CHECK, UNIQUE or NOT NULL
    /// constraint. The message is the one reported by SQLite.
    #[error("constraint violation on '{table}': {message}")]
    ConstraintViolation {
        /// The table the failing statement targeted.
        table: String,
        /// SQLite's description of the violated constraint.
        message: String,
    },

    /// The audit observer failed to record a mutation. The mutation is rolled back.
    #[error("failed to record audit entry for '{object}': {source}")]
    AuditWriteFailure {
        /// The table whose mutation could not be audited.
        object: String,
        /// The observer's error.
        source: ObserverError,
    },

    /// The actor holds no grant covering the requested privilege.
    #[error("actor '{actor}' lacks {privilege} on '{object}'")]
    PermissionDenied {
        actor: String,
        privilege: Privilege,
        object: String,
    },

    /// No query with this name exists in the catalog.
    #[error("unknown query: {0}")]
    UnknownQuery(String),

    /// The parameters supplied to a catalog query are unusable.
    #[error("invalid parameters for query '{query}': {reason}")]
    InvalidParameters { query: String, reason: String },

    /// A catalog query produced columns other than the declared shape.
    #[error("query '{query}' returned columns {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        query: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// A keyed lookup or keyed mutation matched no row.
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    /// A stored payload no longer hashes to its recorded digest.
    #[error("document {document_id} payload does not match its stored digest")]
    DigestMismatch { document_id: i64 },

    /// A stored XML column could not be parsed or lacks a required element.
    #[error("malformed XML in {entity} '{key}': {reason}")]
    MalformedXml {
        entity: &'static str,
        key: String,
        reason: String,
    },

    /// A list or record column could not be encoded or decoded as JSON.
    #[error("column encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Failed to build the connection pool or check out a connection.
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Any other SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl DbError {
    /// Converts a SQLite error raised while writing to `table`, surfacing
    /// constraint failures as [`DbError::ConstraintViolation`].
    pub fn classify(table: &str, err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation {
                    table: table.to_string(),
                    message: message.unwrap_or_else(|| code.to_string()),
                }
            }
            other => Self::Database(other),
        }
    }

    /// Returns true for [`DbError::ConstraintViolation`].
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}
