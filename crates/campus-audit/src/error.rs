//! Error types for the audit log.

/// Errors that can occur during audit log operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// A database operation failed.
    #[error("audit database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row carries an action label outside INSERT/UPDATE/DELETE.
    #[error(transparent)]
    UnknownAction(#[from] crate::entry::ParseAuditActionError),
}
