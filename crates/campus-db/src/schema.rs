//! Declarative table definitions and the schema manager.
//!
//! A [`TableDef`] describes one table: typed columns with nullability,
//! defaults and checks, a primary key, foreign keys, and table-level checks.
//! [`SchemaManager`] validates a set of definitions, orders them so that
//! referenced tables are created before referencing ones, and applies the
//! DDL in a single transaction. Every table it creates is recorded in the
//! `_campus_schema` tracking table.
//!
//! Re-running [`SchemaManager::create_all`] against a database that already
//! holds a managed table is governed by [`RerunPolicy`].

use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Logical column types and their SQLite storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    /// ISO-8601 date stored as TEXT.
    Date,
    Blob,
    /// A list-typed column, stored as a JSON array in TEXT.
    List,
    /// A composite (record) column, stored as a JSON object in TEXT.
    Record,
    /// An XML document stored as TEXT; well-formedness is checked on write.
    Xml,
}

impl ColumnType {
    /// Returns the SQLite type name used in DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Date | Self::List | Self::Record | Self::Xml => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    /// Raw SQL default expression, e.g. `'[]'` or `(datetime('now'))`.
    pub default: Option<String>,
    /// Raw SQL check expression for this column.
    pub check: Option<String>,
    pub unique: bool,
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`; must be the table's only key column.
    pub auto_increment: bool,
}

impl ColumnDef {
    /// A nullable column with no default or constraints.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
            check: None,
            unique: false,
            auto_increment: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self.nullable = false;
        self
    }
}

/// Referential action on delete of the referenced row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    #[default]
    NoAction,
    Cascade,
    SetNull,
}

impl OnDelete {
    fn clause(self) -> Option<&'static str> {
        match self {
            Self::NoAction => None,
            Self::Cascade => Some("ON DELETE CASCADE"),
            Self::SetNull => Some("ON DELETE SET NULL"),
        }
    }
}

/// A foreign key from `columns` to `ref_columns` of `ref_table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: OnDelete,
}

impl ForeignKeyDef {
    pub fn new(columns: &[&str], ref_table: impl Into<String>, ref_columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ref_table: ref_table.into(),
            ref_columns: ref_columns.iter().map(|c| c.to_string()).collect(),
            on_delete: OnDelete::NoAction,
        }
    }

    pub fn on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = action;
        self
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    /// Table-level check expressions.
    pub checks: Vec<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        if column.auto_increment {
            self.primary_key = vec![column.name.clone()];
        }
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.checks.push(expr.into());
        self
    }

    /// Looks up a column by name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of other tables this table references, self references excluded.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> + '_ {
        self.foreign_keys
            .iter()
            .map(|fk| fk.ref_table.as_str())
            .filter(move |t| *t != self.name)
    }
}

/// What [`SchemaManager::create_all`] does when a managed table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerunPolicy {
    /// Drop existing managed tables (reverse dependency order), then create.
    DropExisting,
    /// Fail with [`DbError::AlreadyExists`] and leave the database untouched.
    #[default]
    FailIfExists,
}

/// Renders the `CREATE TABLE` statement for one definition.
///
/// Identifiers are emitted unquoted; [`SchemaManager::new`] rejects names
/// that are not plain identifiers.
pub fn render_ddl(table: &TableDef) -> String {
    let mut parts: Vec<String> = Vec::new();

    for column in &table.columns {
        let mut line = format!("    {} {}", column.name, column.ty.sql_type());
        if column.auto_increment {
            line.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if !column.nullable && !column.auto_increment {
            line.push_str(" NOT NULL");
        }
        if column.unique {
            line.push_str(" UNIQUE");
        }
        if let Some(default) = &column.default {
            line.push_str(&format!(" DEFAULT {default}"));
        }
        if let Some(check) = &column.check {
            line.push_str(&format!(" CHECK ({check})"));
        }
        parts.push(line);
    }

    let has_auto_increment = table.columns.iter().any(|c| c.auto_increment);
    if !has_auto_increment && !table.primary_key.is_empty() {
        parts.push(format!("    PRIMARY KEY ({})", table.primary_key.join(", ")));
    }

    for fk in &table.foreign_keys {
        let mut line = format!(
            "    FOREIGN KEY ({}) REFERENCES {} ({})",
            fk.columns.join(", "),
            fk.ref_table,
            fk.ref_columns.join(", ")
        );
        if let Some(clause) = fk.on_delete.clause() {
            line.push(' ');
            line.push_str(clause);
        }
        parts.push(line);
    }

    for check in &table.checks {
        parts.push(format!("    CHECK ({check})"));
    }

    format!("CREATE TABLE {} (\n{}\n);", table.name, parts.join(",\n"))
}

/// Returns true if a table (or view) named `name` exists.
///
/// # Errors
///
/// Returns `DbError::Database` on SQL failure.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, DbError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1)",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Returns the names recorded in `_campus_schema`, in creation order.
///
/// # Errors
///
/// Returns `DbError::Database` on SQL failure.
pub fn recorded_tables(conn: &Connection) -> Result<Vec<String>, DbError> {
    if !table_exists(conn, TRACKING_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare("SELECT name FROM _campus_schema ORDER BY position ASC")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let mut names = Vec::new();
    for row in rows {
        names.push(row?);
    }
    Ok(names)
}

const TRACKING_TABLE: &str = "_campus_schema";

/// Creates and drops a validated set of table definitions.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    tables: Vec<TableDef>,
    /// Indices into `tables`, referenced tables first.
    order: Vec<usize>,
    policy: RerunPolicy,
    /// Tables that survive a [`RerunPolicy::DropExisting`] re-run.
    preserved: Vec<String>,
}

impl SchemaManager {
    /// Validates `tables` and computes their creation order.
    ///
    /// Foreign keys may point at tables outside the set; those targets are
    /// checked against the live database in [`SchemaManager::create_all`].
    ///
    /// # Errors
    ///
    /// Returns `DbError::Definition` for invalid identifiers, duplicate
    /// tables or columns, missing key columns, FK arity mismatches, unknown
    /// referenced columns, or a dependency cycle.
    pub fn new(tables: Vec<TableDef>, policy: RerunPolicy) -> Result<Self, DbError> {
        let mut by_name: HashMap<&str, &TableDef> = HashMap::new();
        for table in &tables {
            validate_table(table)?;
            if by_name.insert(table.name.as_str(), table).is_some() {
                return Err(DbError::Definition(format!(
                    "table '{}' is defined more than once",
                    table.name
                )));
            }
        }

        for table in &tables {
            for fk in &table.foreign_keys {
                if let Some(target) = by_name.get(fk.ref_table.as_str()) {
                    for column in &fk.ref_columns {
                        if target.find_column(column).is_none() {
                            return Err(DbError::Definition(format!(
                                "foreign key on '{}' references unknown column '{}.{}'",
                                table.name, fk.ref_table, column
                            )));
                        }
                    }
                }
            }
        }

        let order = dependency_order(&tables)?;
        Ok(Self {
            tables,
            order,
            policy,
            preserved: Vec::new(),
        })
    }

    /// Keeps `names` (and their rows) across a [`RerunPolicy::DropExisting`]
    /// re-run. They are still created when missing. [`SchemaManager::drop_all`]
    /// ignores this list.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Definition` if a name is not managed, or if a
    /// preserved table references a table that would be dropped.
    pub fn preserve(mut self, names: &[&str]) -> Result<Self, DbError> {
        for name in names {
            let Some(table) = self.tables.iter().find(|t| t.name == *name) else {
                return Err(DbError::Definition(format!(
                    "cannot preserve unmanaged table '{name}'"
                )));
            };
            for fk in &table.foreign_keys {
                if self.manages(&fk.ref_table) && !names.contains(&fk.ref_table.as_str()) {
                    return Err(DbError::Definition(format!(
                        "preserved table '{}' references dropped table '{}'",
                        table.name, fk.ref_table
                    )));
                }
            }
        }
        self.preserved = names.iter().map(|n| n.to_string()).collect();
        Ok(self)
    }

    fn is_preserved(&self, name: &str) -> bool {
        self.preserved.iter().any(|p| p == name)
    }

    pub fn policy(&self) -> RerunPolicy {
        self.policy
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// Returns the managed tables, referenced tables first.
    pub fn creation_order(&self) -> Vec<&TableDef> {
        self.order.iter().map(|&i| &self.tables[i]).collect()
    }

    fn manages(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name)
    }

    /// Creates every managed table in dependency order inside one transaction.
    ///
    /// Returns the number of tables created.
    ///
    /// # Errors
    ///
    /// - `DbError::Definition` if a foreign key targets a table that is
    ///   neither managed nor present in the database.
    /// - `DbError::AlreadyExists` if a managed table exists and the policy
    ///   is [`RerunPolicy::FailIfExists`].
    /// - `DbError::Database` if a statement fails; nothing is applied.
    pub fn create_all(&self, conn: &Connection) -> Result<usize, DbError> {
        ensure_tracking_table(conn)?;

        let tx = conn.unchecked_transaction()?;

        for table in self.creation_order() {
            for fk in &table.foreign_keys {
                if !self.manages(&fk.ref_table) && !table_exists(&tx, &fk.ref_table)? {
                    return Err(DbError::Definition(format!(
                        "foreign key on '{}' references missing table '{}'",
                        table.name, fk.ref_table
                    )));
                }
            }
        }

        match self.policy {
            RerunPolicy::FailIfExists => {
                for table in self.creation_order() {
                    if table_exists(&tx, &table.name)? {
                        return Err(DbError::AlreadyExists(table.name.clone()));
                    }
                }
            }
            RerunPolicy::DropExisting => {
                let dropped = self.drop_in(&tx, true)?;
                if dropped > 0 {
                    tracing::info!(count = dropped, "dropped existing tables before re-create");
                }
            }
        }

        let mut created = 0;
        for table in self.creation_order() {
            if self.is_preserved(&table.name) && table_exists(&tx, &table.name)? {
                tracing::info!(table = %table.name, "keeping preserved table");
                continue;
            }
            let ddl = render_ddl(table);
            tracing::info!(table = %table.name, "creating table");
            tx.execute_batch(&ddl)?;
            tx.execute(
                "INSERT INTO _campus_schema (name, ddl, position)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM _campus_schema))",
                params![table.name, ddl],
            )?;
            created += 1;
        }

        tx.commit()?;
        Ok(created)
    }

    /// Drops every managed table that exists, referencing tables first.
    ///
    /// Returns the number of tables dropped.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Database` if a drop fails; nothing is dropped.
    pub fn drop_all(&self, conn: &Connection) -> Result<usize, DbError> {
        ensure_tracking_table(conn)?;
        let tx = conn.unchecked_transaction()?;
        let dropped = self.drop_in(&tx, false)?;
        tx.commit()?;
        Ok(dropped)
    }

    fn drop_in(&self, conn: &Connection, keep_preserved: bool) -> Result<usize, DbError> {
        let mut dropped = 0;
        for table in self.creation_order().into_iter().rev() {
            if keep_preserved && self.is_preserved(&table.name) {
                continue;
            }
            if table_exists(conn, &table.name)? {
                tracing::debug!(table = %table.name, "dropping table");
                conn.execute_batch(&format!("DROP TABLE {};", table.name))?;
                dropped += 1;
            }
            conn.execute("DELETE FROM _campus_schema WHERE name = ?1", [&table.name])?;
        }
        Ok(dropped)
    }

    /// Returns the DDL recorded for `name`, if the manager created it.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Database` on SQL failure.
    pub fn recorded_ddl(&self, conn: &Connection, name: &str) -> Result<Option<String>, DbError> {
        if !table_exists(conn, TRACKING_TABLE)? {
            return Ok(None);
        }
        let ddl = conn
            .query_row(
                "SELECT ddl FROM _campus_schema WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ddl)
    }
}

fn ensure_tracking_table(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _campus_schema (
            name TEXT PRIMARY KEY,
            ddl TEXT NOT NULL,
            position INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_table(table: &TableDef) -> Result<(), DbError> {
    let invalid = |msg: String| Err(DbError::Definition(msg));

    if !is_identifier(&table.name) || table.name.starts_with("sqlite_") {
        return invalid(format!("invalid table name '{}'", table.name));
    }
    if table.columns.is_empty() {
        return invalid(format!("table '{}' has no columns", table.name));
    }

    let mut seen = HashSet::new();
    for column in &table.columns {
        if !is_identifier(&column.name) {
            return invalid(format!(
                "invalid column name '{}' in '{}'",
                column.name, table.name
            ));
        }
        if !seen.insert(column.name.as_str()) {
            return invalid(format!(
                "column '{}' is defined more than once in '{}'",
                column.name, table.name
            ));
        }
        if column.auto_increment && column.ty != ColumnType::Integer {
            return invalid(format!(
                "auto-increment column '{}.{}' must be INTEGER",
                table.name, column.name
            ));
        }
    }

    if table.primary_key.is_empty() {
        return invalid(format!("table '{}' has no primary key", table.name));
    }
    for key in &table.primary_key {
        if table.find_column(key).is_none() {
            return invalid(format!(
                "primary key column '{}' is not a column of '{}'",
                key, table.name
            ));
        }
    }
    let auto: Vec<&ColumnDef> = table.columns.iter().filter(|c| c.auto_increment).collect();
    if auto.len() > 1 || (auto.len() == 1 && table.primary_key != [auto[0].name.clone()]) {
        return invalid(format!(
            "auto-increment column in '{}' must be the sole primary key",
            table.name
        ));
    }

    for fk in &table.foreign_keys {
        if !is_identifier(&fk.ref_table) {
            return invalid(format!("invalid referenced table '{}'", fk.ref_table));
        }
        if fk.columns.is_empty() || fk.columns.len() != fk.ref_columns.len() {
            return invalid(format!(
                "foreign key on '{}' to '{}' has mismatched column counts",
                table.name, fk.ref_table
            ));
        }
        for column in &fk.columns {
            if table.find_column(column).is_none() {
                return invalid(format!(
                    "foreign key column '{}' is not a column of '{}'",
                    column, table.name
                ));
            }
        }
        if fk.ref_columns.iter().any(|c| !is_identifier(c)) {
            return invalid(format!(
                "foreign key on '{}' has an invalid referenced column",
                table.name
            ));
        }
    }

    Ok(())
}

/// Orders tables so every in-set dependency precedes its dependents.
/// Ties keep declaration order.
fn dependency_order(tables: &[TableDef]) -> Result<Vec<usize>, DbError> {
    let index: HashMap<&str, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.as_str(), i))
        .collect();

    let mut placed = vec![false; tables.len()];
    let mut order = Vec::with_capacity(tables.len());

    while order.len() < tables.len() {
        let next = tables.iter().enumerate().position(|(i, table)| {
            !placed[i]
                && table
                    .dependencies()
                    .all(|dep| index.get(dep).map_or(true, |&d| placed[d]))
        });

        match next {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                let stuck: Vec<&str> = tables
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !placed[*i])
                    .map(|(_, t)| t.name.as_str())
                    .collect();
                return Err(DbError::Definition(format!(
                    "foreign-key cycle among tables: {}",
                    stuck.join(", ")
                )));
            }
        }
    }

    Ok(order)
}
