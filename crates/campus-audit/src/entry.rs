//! Action, details, and record types for the audit log.

use campus_db::MutationKind;
use serde::{Deserialize, Serialize};

/// The kind of mutation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
}

impl AuditAction {
    /// Returns the label stored in the `action` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl From<MutationKind> for AuditAction {
    fn from(kind: MutationKind) -> Self {
        match kind {
            MutationKind::Insert => Self::Insert,
            MutationKind::Update => Self::Update,
            MutationKind::Delete => Self::Delete,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = ParseAuditActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ParseAuditActionError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown audit action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown audit action: {0}")]
pub struct ParseAuditActionError(pub String);

/// Structured payload stored in `details_json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditDetails {
    /// Rows changed by the audited statement.
    pub affected_rows: usize,
}

/// One row of the `audit_log` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    /// Position in the log; strictly increasing, starting at 1.
    pub seq: i64,
    pub actor: String,
    pub action: AuditAction,
    /// The table the mutation targeted.
    pub object_name: String,
    /// Key of the affected row, when known.
    pub row_key: Option<String>,
    pub details_json: String,
    /// SQLite `datetime('now')`, UTC, `YYYY-MM-DD HH:MM:SS`.
    pub occurred_at: String,
}

impl AuditEntry {
    /// Decodes `details_json`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the stored details are malformed.
    pub fn details(&self) -> Result<AuditDetails, serde_json::Error> {
        serde_json::from_str(&self.details_json)
    }
}
