//! Append-only audit log for the Campus teaching database.
//!
//! Every insert, update, or delete made through
//! [`campus_db::apply_mutation`] against a monitored table is recorded as
//! one row of `audit_log`: who did it, what kind of change it was, which
//! table and row it touched, and when. The log is never updated or pruned.
//!
//! | Column | Meaning |
//! |--------|---------|
//! | `seq` | position in the log, strictly increasing |
//! | `actor` | the acting user |
//! | `action` | `INSERT`, `UPDATE` or `DELETE` |
//! | `object_name` | target table |
//! | `row_key` | key of the affected row, when known |
//! | `details_json` | `{"affected_rows": n}` |
//! | `occurred_at` | UTC timestamp |
//!
//! # Usage
//!
//! ```rust,ignore
//! use campus_audit::{query_entries, AuditFilter, AuditRecorder};
//!
//! let recorder = AuditRecorder::new();
//! campus_db::enroll_student(&conn, "alice.registrar", &enrollment, &recorder)?;
//!
//! let entries = query_entries(&conn, &AuditFilter {
//!     object_name: Some("enrollments".into()),
//!     ..Default::default()
//! })?;
//! ```

mod entry;
mod error;
mod recorder;
mod store;

pub use entry::{AuditAction, AuditDetails, AuditEntry, ParseAuditActionError};
pub use error::AuditError;
pub use recorder::AuditRecorder;
pub use store::{count_for_object, query_entries, record_entry, AuditFilter};

#[cfg(test)]
mod tests;
