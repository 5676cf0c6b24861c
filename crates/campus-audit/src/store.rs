//! Persistence operations for the audit log.
//!
//! All writes go through [`record_entry`], which serialises the details,
//! assigns a monotonically increasing sequence number, and inserts into
//! the `audit_log` table in a single statement.
//!
//! Reads go through [`query_entries`], which supports filtering by actor,
//! action, object, and time range.

use rusqlite::{params, Connection};

use crate::entry::{AuditAction, AuditDetails, AuditEntry};
use crate::error::AuditError;

/// Appends one entry to the audit log.
///
/// # Errors
///
/// Returns `AuditError::Database` on SQL failure (including a missing
/// `audit_log` table) or `AuditError::Serialization` if the details cannot
/// be serialised.
pub fn record_entry(
    conn: &Connection,
    actor: &str,
    action: AuditAction,
    object_name: &str,
    row_key: Option<&str>,
    details: &AuditDetails,
) -> Result<AuditEntry, AuditError> {
    let details_json = serde_json::to_string(details)?;

    // The sequence number is computed inside the INSERT so that no other
    // writer can observe the same MAX(seq) in between.
    let (id, seq, occurred_at) = conn.query_row(
        "INSERT INTO audit_log (seq, actor, action, object_name, row_key, details_json, occurred_at)
         VALUES (
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM audit_log),
            ?1, ?2, ?3, ?4, ?5,
            datetime('now')
         )
         RETURNING id, seq, occurred_at",
        params![actor, action.as_str(), object_name, row_key, details_json],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?)),
    )?;

    Ok(AuditEntry {
        id,
        seq,
        actor: actor.to_string(),
        action,
        object_name: object_name.to_string(),
        row_key: row_key.map(str::to_string),
        details_json,
        occurred_at,
    })
}

/// Filter criteria for querying the audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub actor: Option<String>,
    pub action: Option<AuditAction>,
    /// Filter by target table.
    pub object_name: Option<String>,
    /// Return entries recorded at or after this timestamp
    /// (`YYYY-MM-DD HH:MM:SS`, UTC).
    pub since: Option<String>,
    /// Maximum number of entries to return (default: 100). Values below
    /// one are treated as one.
    pub limit: Option<i64>,
}

/// Queries the audit log, oldest first.
///
/// # Errors
///
/// Returns `AuditError::Database` on SQL failure.
pub fn query_entries(conn: &Connection, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref actor) = filter.actor {
        clauses.push(format!("actor = ?{idx}"));
        param_values.push(Box::new(actor.clone()));
        idx += 1;
    }

    if let Some(action) = filter.action {
        clauses.push(format!("action = ?{idx}"));
        param_values.push(Box::new(action.as_str()));
        idx += 1;
    }

    if let Some(ref object) = filter.object_name {
        clauses.push(format!("object_name = ?{idx}"));
        param_values.push(Box::new(object.clone()));
        idx += 1;
    }

    if let Some(ref since) = filter.since {
        clauses.push(format!("occurred_at >= ?{idx}"));
        param_values.push(Box::new(since.clone()));
        idx += 1;
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, seq, actor, action, object_name, row_key, details_json, occurred_at
         FROM audit_log
         {where_clause}
         ORDER BY seq ASC
         LIMIT ?{idx}"
    );

    // SQLite reads a negative LIMIT as no limit at all.
    param_values.push(Box::new(filter.limit.unwrap_or(100).max(1)));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok((
            AuditEntry {
                id: row.get(0)?,
                seq: row.get(1)?,
                actor: row.get(2)?,
                action: AuditAction::Insert,
                object_name: row.get(4)?,
                row_key: row.get(5)?,
                details_json: row.get(6)?,
                occurred_at: row.get(7)?,
            },
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (mut entry, action) = row?;
        entry.action = action.parse()?;
        entries.push(entry);
    }

    Ok(entries)
}

/// Counts the entries recorded against `object_name`.
///
/// # Errors
///
/// Returns `AuditError::Database` on SQL failure.
pub fn count_for_object(conn: &Connection, object_name: &str) -> Result<i64, AuditError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM audit_log WHERE object_name = ?1",
        [object_name],
        |row| row.get(0),
    )?;
    Ok(count)
}
