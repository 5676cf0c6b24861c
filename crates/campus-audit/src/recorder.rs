//! The mutation observer that writes the audit log.

use std::collections::BTreeSet;

use campus_db::{MutationEvent, MutationObserver, ObserverError, MONITORED_TABLES};
use rusqlite::Connection;

use crate::entry::{AuditAction, AuditDetails};
use crate::store::record_entry;

/// Appends an audit entry for every mutation against a monitored table.
///
/// Mutations against other tables pass through unrecorded. The entry is
/// written on the mutation's own connection, inside its transaction, so a
/// failed write rolls the mutation back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecorder {
    monitored: BTreeSet<String>,
}

impl AuditRecorder {
    /// Monitors the campus domain tables.
    pub fn new() -> Self {
        Self::for_tables(MONITORED_TABLES.iter().copied())
    }

    pub fn for_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            monitored: tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn monitors(&self, table: &str) -> bool {
        self.monitored.contains(table)
    }

    pub fn monitored_tables(&self) -> impl Iterator<Item = &str> + '_ {
        self.monitored.iter().map(String::as_str)
    }
}

impl Default for AuditRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationObserver for AuditRecorder {
    fn after_mutation(
        &self,
        conn: &Connection,
        event: &MutationEvent<'_>,
    ) -> Result<(), ObserverError> {
        if !self.monitors(event.table) {
            return Ok(());
        }

        let entry = record_entry(
            conn,
            event.actor,
            AuditAction::from(event.kind),
            event.table,
            event.row_key.as_deref(),
            &AuditDetails {
                affected_rows: event.affected_rows,
            },
        )?;

        tracing::debug!(
            seq = entry.seq,
            actor = %entry.actor,
            action = entry.action.as_str(),
            object = %entry.object_name,
            "audit entry recorded"
        );
        Ok(())
    }
}
