//! Audited, access-checked mutations.
//!
//! Every write that should leave an audit trail goes through
//! [`apply_mutation`]. Inside one transaction it checks the actor's
//! privilege on the target table, executes the statement, and hands a
//! [`MutationEvent`] to the [`MutationObserver`]. If the observer fails the
//! transaction is rolled back and the caller gets
//! [`DbError::AuditWriteFailure`].

use campus_types::{Enrollment, Grade, Privilege};
use rusqlite::{params_from_iter, Connection};

use crate::access;
use crate::catalog::tables;
use crate::error::{DbError, ObserverError};
use crate::value::Value;

/// The kind of row change a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

impl MutationKind {
    /// Returns the privilege an actor needs to perform this kind of mutation.
    pub fn privilege(self) -> Privilege {
        match self {
            Self::Insert => Privilege::Insert,
            Self::Update => Privilege::Update,
            Self::Delete => Privilege::Delete,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// A single parameterised write against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub table: String,
    pub kind: MutationKind,
    pub sql: String,
    pub params: Vec<Value>,
    /// Identifies the affected row in the audit log. Inserts without a key
    /// fall back to the new rowid.
    pub row_key: Option<String>,
    /// Fail with [`DbError::NotFound`] (and roll back) when no row changes.
    pub require_rows: bool,
}

impl Mutation {
    pub fn new(table: &str, kind: MutationKind, sql: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            kind,
            sql: sql.into(),
            params: Vec::new(),
            row_key: None,
            require_rows: false,
        }
    }

    pub fn params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn row_key(mut self, key: impl Into<String>) -> Self {
        self.row_key = Some(key.into());
        self
    }

    pub fn require_rows(mut self) -> Self {
        self.require_rows = true;
        self
    }
}

/// What the observer is told after a mutation executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent<'a> {
    pub actor: &'a str,
    pub kind: MutationKind,
    pub table: &'a str,
    pub row_key: Option<String>,
    pub affected_rows: usize,
}

/// Result of a committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub affected_rows: usize,
    /// Rowid of the inserted row; `None` for updates and deletes.
    pub inserted_rowid: Option<i64>,
}

/// A synchronous hook invoked inside the mutation's transaction.
///
/// Writes made through `conn` commit or roll back together with the
/// mutation itself.
pub trait MutationObserver {
    /// Records the mutation. An error aborts the mutation.
    fn after_mutation(
        &self,
        conn: &Connection,
        event: &MutationEvent<'_>,
    ) -> Result<(), ObserverError>;
}

/// An observer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MutationObserver for NoopObserver {
    fn after_mutation(&self, _: &Connection, _: &MutationEvent<'_>) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Checks access, executes `mutation`, and notifies `observer`, atomically.
///
/// # Errors
///
/// - `DbError::PermissionDenied` if `actor` lacks the privilege.
/// - `DbError::ConstraintViolation` if the statement violates a constraint.
/// - `DbError::NotFound` if `require_rows` is set and nothing changed.
/// - `DbError::AuditWriteFailure` if the observer fails.
///
/// In every error case the database is left unchanged.
pub fn apply_mutation(
    conn: &Connection,
    actor: &str,
    mutation: &Mutation,
    observer: &dyn MutationObserver,
) -> Result<MutationOutcome, DbError> {
    let tx = conn.unchecked_transaction()?;

    access::require(&tx, actor, mutation.kind.privilege(), &mutation.table)?;

    let affected_rows = tx
        .execute(&mutation.sql, params_from_iter(mutation.params.iter()))
        .map_err(|e| DbError::classify(&mutation.table, e))?;

    if mutation.require_rows && affected_rows == 0 {
        return Err(DbError::NotFound {
            entity: "row",
            key: format!(
                "{}/{}",
                mutation.table,
                mutation.row_key.as_deref().unwrap_or("?")
            ),
        });
    }

    let inserted_rowid = match mutation.kind {
        MutationKind::Insert if affected_rows > 0 => Some(tx.last_insert_rowid()),
        _ => None,
    };

    let event = MutationEvent {
        actor,
        kind: mutation.kind,
        table: &mutation.table,
        row_key: mutation
            .row_key
            .clone()
            .or_else(|| inserted_rowid.map(|id| id.to_string())),
        affected_rows,
    };

    observer
        .after_mutation(&tx, &event)
        .map_err(|source| {
            tracing::error!(
                actor,
                table = %mutation.table,
                action = mutation.kind.as_str(),
                "audit write failed, rolling back mutation: {}",
                source
            );
            DbError::AuditWriteFailure {
                object: mutation.table.clone(),
                source,
            }
        })?;

    tx.commit()?;

    tracing::debug!(
        actor,
        table = %mutation.table,
        action = mutation.kind.as_str(),
        rows = affected_rows,
        "mutation applied"
    );

    Ok(MutationOutcome {
        affected_rows,
        inserted_rowid,
    })
}

fn enrollment_key(student_id: i64, course_id: i64) -> String {
    format!("{student_id}/{course_id}")
}

/// Enrolls a student in a course.
///
/// # Errors
///
/// See [`apply_mutation`]. Enrolling twice in the same course, or in an
/// unknown student or course, is a `ConstraintViolation`.
pub fn enroll_student(
    conn: &Connection,
    actor: &str,
    enrollment: &Enrollment,
    observer: &dyn MutationObserver,
) -> Result<MutationOutcome, DbError> {
    let mutation = Mutation::new(
        tables::ENROLLMENTS,
        MutationKind::Insert,
        "INSERT INTO enrollments (student_id, course_id, enrolled_on, grade)
         VALUES (?1, ?2, ?3, ?4)",
    )
    .params(vec![
        Value::from(enrollment.student_id),
        Value::from(enrollment.course_id),
        Value::from(enrollment.enrolled_on.to_string()),
        Value::from(enrollment.grade.map(Grade::as_str)),
    ])
    .row_key(enrollment_key(enrollment.student_id, enrollment.course_id));

    apply_mutation(conn, actor, &mutation, observer)
}

/// Sets (or clears) the grade on an existing enrollment.
///
/// # Errors
///
/// See [`apply_mutation`]; `DbError::NotFound` if the enrollment does not exist.
pub fn set_grade(
    conn: &Connection,
    actor: &str,
    student_id: i64,
    course_id: i64,
    grade: Option<Grade>,
    observer: &dyn MutationObserver,
) -> Result<MutationOutcome, DbError> {
    let mutation = Mutation::new(
        tables::ENROLLMENTS,
        MutationKind::Update,
        "UPDATE enrollments SET grade = ?1 WHERE student_id = ?2 AND course_id = ?3",
    )
    .params(vec![
        Value::from(grade.map(Grade::as_str)),
        Value::from(student_id),
        Value::from(course_id),
    ])
    .row_key(enrollment_key(student_id, course_id))
    .require_rows();

    apply_mutation(conn, actor, &mutation, observer)
}

/// Removes an enrollment.
///
/// # Errors
///
/// See [`apply_mutation`]; `DbError::NotFound` if the enrollment does not exist.
pub fn withdraw_enrollment(
    conn: &Connection,
    actor: &str,
    student_id: i64,
    course_id: i64,
    observer: &dyn MutationObserver,
) -> Result<MutationOutcome, DbError> {
    let mutation = Mutation::new(
        tables::ENROLLMENTS,
        MutationKind::Delete,
        "DELETE FROM enrollments WHERE student_id = ?1 AND course_id = ?2",
    )
    .params(vec![Value::from(student_id), Value::from(course_id)])
    .row_key(enrollment_key(student_id, course_id))
    .require_rows();

    apply_mutation(conn, actor, &mutation, observer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{load_fixtures, sample_fixtures};
    use crate::pool::open_in_memory;
    use crate::schema::{RerunPolicy, SchemaManager};
    use crate::catalog::campus_tables;
    use chrono::NaiveDate;
    use std::cell::RefCell;

    fn test_db() -> Connection {
        let conn = open_in_memory().expect("should open");
        SchemaManager::new(campus_tables(), RerunPolicy::FailIfExists)
            .expect("valid schema")
            .create_all(&conn)
            .expect("schema should be created");
        load_fixtures(&conn, &sample_fixtures()).expect("fixtures should load");
        conn
    }

    #[derive(Default)]
    struct Recording {
        events: RefCell<Vec<(String, MutationKind, String, Option<String>, usize)>>,
    }

    impl MutationObserver for Recording {
        fn after_mutation(
            &self,
            _: &Connection,
            event: &MutationEvent<'_>,
        ) -> Result<(), ObserverError> {
            self.events.borrow_mut().push((
                event.actor.to_string(),
                event.kind,
                event.table.to_string(),
                event.row_key.clone(),
                event.affected_rows,
            ));
            Ok(())
        }
    }

    struct Failing;

    impl MutationObserver for Failing {
        fn after_mutation(&self, _: &Connection, _: &MutationEvent<'_>) -> Result<(), ObserverError> {
            Err("audit table unavailable".into())
        }
    }

    fn enrollment(student_id: i64, course_id: i64) -> Enrollment {
        Enrollment {
            student_id,
            course_id,
            enrolled_on: NaiveDate::from_ymd_opt(2024, 9, 1).expect("valid date"),
            grade: None,
        }
    }

    fn count_enrollments(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM enrollments", [], |row| row.get(0))
            .expect("should count")
    }

    #[test]
    fn enroll_notifies_observer() {
        let conn = test_db();
        let observer = Recording::default();

        let outcome = enroll_student(&conn, "alice.registrar", &enrollment(4, 105), &observer)
            .expect("enroll should succeed");
        assert_eq!(outcome.affected_rows, 1);
        assert!(outcome.inserted_rowid.is_some());

        let events = observer.events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            (
                "alice.registrar".to_string(),
                MutationKind::Insert,
                "enrollments".to_string(),
                Some("4/105".to_string()),
                1
            )
        );
    }

    #[test]
    fn denied_actor_changes_nothing() {
        let conn = test_db();
        let observer = Recording::default();
        let before = count_enrollments(&conn);

        let err = enroll_student(&conn, "mallory", &enrollment(4, 105), &observer)
            .expect_err("mallory has no grant");
        assert!(matches!(err, DbError::PermissionDenied { .. }));
        assert_eq!(count_enrollments(&conn), before);
        assert!(observer.events.borrow().is_empty());
    }

    #[test]
    fn failing_observer_rolls_back() {
        let conn = test_db();
        let before = count_enrollments(&conn);

        let err = enroll_student(&conn, "alice.registrar", &enrollment(4, 105), &Failing)
            .expect_err("observer failure is fatal");
        match err {
            DbError::AuditWriteFailure { object, .. } => assert_eq!(object, "enrollments"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(count_enrollments(&conn), before);
    }

    #[test]
    fn duplicate_enrollment_is_a_constraint_violation() {
        let conn = test_db();
        let err = enroll_student(&conn, "alice.registrar", &enrollment(5, 101), &NoopObserver)
            .expect_err("student 5 is already in course 101");
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn enroll_in_unknown_course_is_a_constraint_violation() {
        let conn = test_db();
        let err = enroll_student(&conn, "alice.registrar", &enrollment(1, 999), &NoopObserver)
            .expect_err("course 999 does not exist");
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn set_grade_and_withdraw() {
        let conn = test_db();
        let observer = Recording::default();

        set_grade(&conn, "alice.registrar", 3, 104, Some(Grade::A), &observer)
            .expect("grade should be set");
        let grade: Option<String> = conn
            .query_row(
                "SELECT grade FROM enrollments WHERE student_id = 3 AND course_id = 104",
                [],
                |row| row.get(0),
            )
            .expect("should read grade");
        assert_eq!(grade.as_deref(), Some("A"));

        withdraw_enrollment(&conn, "alice.registrar", 3, 104, &observer)
            .expect("withdraw should succeed");

        let events = observer.events.borrow();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1, MutationKind::Update);
        assert_eq!(events[1].1, MutationKind::Delete);
    }

    #[test]
    fn missing_enrollment_is_not_found_and_not_observed() {
        let conn = test_db();
        let observer = Recording::default();

        let err = withdraw_enrollment(&conn, "alice.registrar", 1, 105, &observer)
            .expect_err("student 1 is not in course 105");
        assert!(matches!(err, DbError::NotFound { .. }));
        assert!(observer.events.borrow().is_empty());
    }
}
