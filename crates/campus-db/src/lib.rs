//! Database layer for the Campus teaching database.
//!
//! Provides SQLite connection pooling (via `r2d2`), the declarative schema
//! manager, the sample fixtures, the named query catalog, the access policy,
//! and the audited mutation path. SQLite does the relational work; this
//! crate decides what gets created, loaded, queried and checked.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: no external database process is required.
//!   File-backed databases run in WAL mode; `:memory:` databases live and
//!   die with their single pooled connection.
//! - **Declarative tables**: [`TableDef`] values are rendered to DDL and
//!   created in foreign-key order, so the schema cannot be created in an
//!   order SQLite would reject.
//! - **Observers instead of triggers**: mutations go through
//!   [`apply_mutation`], which calls a [`MutationObserver`] inside the same
//!   transaction. The audit log lives in `campus-audit`.

mod access;
mod catalog;
mod documents;
mod error;
mod fixtures;
mod functions;
mod mutation;
mod pool;
mod products;
mod queries;
mod schema;
mod value;

pub use access::{
    assign_role, grant, grants_for, is_permitted, remove_role, require, revoke, Grant, PUBLIC_ROLE,
};
pub use catalog::{campus_tables, tables, MONITORED_TABLES, PRESERVED_TABLES};
pub use documents::{
    digest_hex, fetch_document, list_documents, sign_document, store_document, verify,
    verify_document, Verification,
};
pub use error::{DbError, ObserverError};
pub use fixtures::{
    fetch_student, insert_course, insert_department, insert_employee, insert_enrollment,
    insert_student, load_fixtures, sample_fixtures, FixtureReport, FixtureSet,
};
pub use functions::register_functions;
pub use mutation::{
    apply_mutation, enroll_student, set_grade, withdraw_enrollment, Mutation, MutationEvent,
    MutationKind, MutationObserver, MutationOutcome, NoopObserver,
};
pub use pool::{configure_connection, create_pool, open_in_memory, DbPool, DbRuntimeSettings};
pub use products::{insert_product, list_products, parse_details, ProductDetails};
pub use queries::{
    catalog, definition, run_definition, run_named, run_query, ParamDef, QueryDef, QueryName,
    QueryResult,
};
pub use schema::{
    recorded_tables, render_ddl, table_exists, ColumnDef, ColumnType, ForeignKeyDef, OnDelete,
    RerunPolicy, SchemaManager, TableDef,
};
pub use value::Value;

use campus_types::Privilege;
use rusqlite::Connection;

/// Creates the campus schema under `policy` and loads the sample fixtures.
///
/// The audit log is kept, rows included, when `policy` drops and recreates
/// an existing schema.
///
/// # Errors
///
/// Returns `DbError::AlreadyExists` when the schema is present and `policy`
/// is [`RerunPolicy::FailIfExists`], or any error from
/// [`SchemaManager::create_all`] and [`load_fixtures`].
pub fn setup(conn: &Connection, policy: RerunPolicy) -> Result<FixtureReport, DbError> {
    let manager = SchemaManager::new(campus_tables(), policy)?.preserve(PRESERVED_TABLES)?;
    let created = manager.create_all(conn)?;
    tracing::info!(tables = created, ?policy, "campus schema created");
    load_fixtures(conn, &sample_fixtures())
}

/// Runs [`setup`] on behalf of `actor`.
///
/// Once grants exist, `actor` needs `ALL` on the schema tracking table
/// ([`tables::SCHEMA`]). A database with no grant table yet has nothing
/// to protect, so the first setup is open.
///
/// # Errors
///
/// Returns `DbError::PermissionDenied` for an actor without the grant,
/// otherwise see [`setup`].
pub fn setup_as(
    conn: &Connection,
    actor: &str,
    policy: RerunPolicy,
) -> Result<FixtureReport, DbError> {
    if table_exists(conn, tables::ACCESS_GRANTS)? {
        require(conn, actor, Privilege::All, tables::SCHEMA)?;
    }
    let report = setup(conn, policy)?;
    tracing::info!(actor, ?policy, "schema set up by actor");
    Ok(report)
}
