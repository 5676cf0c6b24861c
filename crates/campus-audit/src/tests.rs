//! Unit tests for the audit log.

use campus_db::{
    apply_mutation, enroll_student, set_grade, setup, withdraw_enrollment, DbError, Mutation,
    MutationKind, RerunPolicy, Value,
};
use campus_types::{Enrollment, Grade};
use chrono::NaiveDate;
use rusqlite::Connection;

use crate::entry::{AuditAction, AuditDetails};
use crate::error::AuditError;
use crate::recorder::AuditRecorder;
use crate::store::{count_for_object, query_entries, record_entry, AuditFilter};

/// Creates an in-memory database with the campus schema and fixtures.
fn test_db() -> Connection {
    let conn = campus_db::open_in_memory().expect("should open in-memory db");
    setup(&conn, RerunPolicy::FailIfExists).expect("setup should succeed");
    conn
}

fn enrollment(student_id: i64, course_id: i64) -> Enrollment {
    Enrollment {
        student_id,
        course_id,
        enrolled_on: NaiveDate::from_ymd_opt(2025, 1, 20).expect("valid date"),
        grade: None,
    }
}

// ── record_entry tests ───────────────────────────────────────────────

#[test]
fn record_entry_inserts_row() {
    let conn = test_db();

    let entry = record_entry(
        &conn,
        "alice.registrar",
        AuditAction::Insert,
        "enrollments",
        Some("4/105"),
        &AuditDetails { affected_rows: 1 },
    )
    .expect("record should succeed");

    assert!(entry.id > 0, "returned row ID should be positive");
    assert_eq!(entry.seq, 1);

    let (actor, action, object, row_key): (String, String, String, Option<String>) = conn
        .query_row(
            "SELECT actor, action, object_name, row_key FROM audit_log WHERE id = ?1",
            [entry.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .expect("should query inserted row");

    assert_eq!(actor, "alice.registrar");
    assert_eq!(action, "INSERT");
    assert_eq!(object, "enrollments");
    assert_eq!(row_key.as_deref(), Some("4/105"));
}

#[test]
fn details_round_trip_through_json() {
    let conn = test_db();
    let entry = record_entry(
        &conn,
        "admin",
        AuditAction::Delete,
        "students",
        None,
        &AuditDetails { affected_rows: 3 },
    )
    .expect("record should succeed");

    assert_eq!(entry.details_json, r#"{"affected_rows":3}"#);
    assert_eq!(
        entry.details().expect("details should decode"),
        AuditDetails { affected_rows: 3 }
    );
}

#[test]
fn missing_audit_table_is_an_error() {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    let err = record_entry(
        &conn,
        "admin",
        AuditAction::Insert,
        "students",
        None,
        &AuditDetails::default(),
    )
    .expect_err("no audit_log table");
    assert!(matches!(err, AuditError::Database(_)));
}

// ── Sequence number tests ────────────────────────────────────────────

#[test]
fn sequence_numbers_strictly_increase() {
    let conn = test_db();
    let mut seqs = Vec::new();
    for action in [AuditAction::Insert, AuditAction::Update, AuditAction::Delete] {
        let entry = record_entry(
            &conn,
            "admin",
            action,
            "courses",
            Some("101"),
            &AuditDetails { affected_rows: 1 },
        )
        .expect("record should succeed");
        seqs.push(entry.seq);
    }
    assert_eq!(seqs, vec![1, 2, 3]);
}

// ── query_entries tests ──────────────────────────────────────────────

fn seed_entries(conn: &Connection) {
    let rows = [
        ("alice.registrar", AuditAction::Insert, "enrollments"),
        ("alice.registrar", AuditAction::Update, "enrollments"),
        ("henry.hr", AuditAction::Update, "employees"),
        ("dora.archivist", AuditAction::Insert, "documents"),
        ("alice.registrar", AuditAction::Delete, "enrollments"),
    ];
    for (actor, action, object) in rows {
        record_entry(conn, actor, action, object, None, &AuditDetails { affected_rows: 1 })
            .expect("seed entry");
    }
}

#[test]
fn query_entries_returns_all_oldest_first() {
    let conn = test_db();
    seed_entries(&conn);

    let entries = query_entries(&conn, &AuditFilter::default()).expect("query should succeed");
    assert_eq!(entries.len(), 5);
    let seqs: Vec<i64> = entries.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
}

#[test]
fn query_entries_filters_combine() {
    let conn = test_db();
    seed_entries(&conn);

    let by_actor = query_entries(
        &conn,
        &AuditFilter {
            actor: Some("alice.registrar".to_string()),
            ..Default::default()
        },
    )
    .expect("query should succeed");
    assert_eq!(by_actor.len(), 3);

    let updates_on_enrollments = query_entries(
        &conn,
        &AuditFilter {
            action: Some(AuditAction::Update),
            object_name: Some("enrollments".to_string()),
            ..Default::default()
        },
    )
    .expect("query should succeed");
    assert_eq!(updates_on_enrollments.len(), 1);
    assert_eq!(updates_on_enrollments[0].seq, 2);
    assert_eq!(updates_on_enrollments[0].action, AuditAction::Update);
}

#[test]
fn query_entries_respects_limit_and_since() {
    let conn = test_db();
    seed_entries(&conn);

    let limited = query_entries(
        &conn,
        &AuditFilter {
            limit: Some(2),
            ..Default::default()
        },
    )
    .expect("query should succeed");
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[1].seq, 2);

    let future = query_entries(
        &conn,
        &AuditFilter {
            since: Some("2999-01-01 00:00:00".to_string()),
            ..Default::default()
        },
    )
    .expect("query should succeed");
    assert!(future.is_empty());

    let past = query_entries(
        &conn,
        &AuditFilter {
            since: Some("2000-01-01 00:00:00".to_string()),
            ..Default::default()
        },
    )
    .expect("query should succeed");
    assert_eq!(past.len(), 5);
}

#[test]
fn non_positive_limit_returns_one_entry() {
    let conn = test_db();
    seed_entries(&conn);

    for limit in [0, -1, i64::MIN] {
        let entries = query_entries(
            &conn,
            &AuditFilter {
                limit: Some(limit),
                ..Default::default()
            },
        )
        .expect("query should succeed");
        assert_eq!(entries.len(), 1, "limit {limit}");
        assert_eq!(entries[0].seq, 1);
    }
}

// ── AuditRecorder tests ──────────────────────────────────────────────

#[test]
fn audited_mutation_appends_exactly_one_entry() {
    let conn = test_db();
    let recorder = AuditRecorder::new();

    enroll_student(&conn, "alice.registrar", &enrollment(4, 105), &recorder)
        .expect("enroll should succeed");

    let entries = query_entries(&conn, &AuditFilter::default()).expect("query should succeed");
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.actor, "alice.registrar");
    assert_eq!(entry.action, AuditAction::Insert);
    assert_eq!(entry.object_name, "enrollments");
    assert_eq!(entry.row_key.as_deref(), Some("4/105"));
    assert_eq!(entry.details().expect("details").affected_rows, 1);
}

#[test]
fn each_mutation_kind_is_recorded() {
    let conn = test_db();
    let recorder = AuditRecorder::new();

    enroll_student(&conn, "admin", &enrollment(4, 105), &recorder).expect("insert");
    set_grade(&conn, "admin", 4, 105, Some(Grade::B), &recorder).expect("update");
    withdraw_enrollment(&conn, "admin", 4, 105, &recorder).expect("delete");

    let actions: Vec<AuditAction> = query_entries(&conn, &AuditFilter::default())
        .expect("query should succeed")
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![AuditAction::Insert, AuditAction::Update, AuditAction::Delete]
    );
}

#[test]
fn rejected_mutation_leaves_no_entry() {
    let conn = test_db();
    let recorder = AuditRecorder::new();

    let denied = enroll_student(&conn, "mallory", &enrollment(4, 105), &recorder)
        .expect_err("mallory has no grant");
    assert!(matches!(denied, DbError::PermissionDenied { .. }));

    let duplicate = enroll_student(&conn, "alice.registrar", &enrollment(5, 101), &recorder)
        .expect_err("student 5 is already in 101");
    assert!(duplicate.is_constraint_violation());

    assert_eq!(count_for_object(&conn, "enrollments").expect("count"), 0);
}

#[test]
fn unmonitored_tables_are_not_recorded() {
    let conn = test_db();
    let recorder = AuditRecorder::for_tables(["students"]);
    assert!(!recorder.monitors("enrollments"));

    enroll_student(&conn, "alice.registrar", &enrollment(4, 105), &recorder)
        .expect("enroll should succeed");
    let entries = query_entries(&conn, &AuditFilter::default()).expect("query");
    assert!(entries.is_empty());
}

#[test]
fn audit_failure_rolls_back_the_mutation() {
    let conn = test_db();
    conn.execute_batch("DROP TABLE audit_log").expect("drop audit table");

    let err = enroll_student(&conn, "alice.registrar", &enrollment(4, 105), &AuditRecorder::new())
        .expect_err("audit write should fail");
    match err {
        DbError::AuditWriteFailure { object, .. } => assert_eq!(object, "enrollments"),
        other => panic!("unexpected error: {other:?}"),
    }

    let enrolled: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM enrollments WHERE student_id = 4 AND course_id = 105",
            [],
            |row| row.get(0),
        )
        .expect("should count");
    assert_eq!(enrolled, 0, "mutation must be rolled back");
}

#[test]
fn generic_mutation_falls_back_to_rowid() {
    let conn = test_db();
    let recorder = AuditRecorder::new();

    let mutation = Mutation::new(
        "departments",
        MutationKind::Insert,
        "INSERT INTO departments (department_id, name, location) VALUES (?1, ?2, ?3)",
    )
    .params(vec![
        Value::Integer(4),
        Value::from("Physics"),
        Value::from("Building D"),
    ]);
    let outcome = apply_mutation(&conn, "henry.hr", &mutation, &recorder).expect("insert");

    let entries = query_entries(
        &conn,
        &AuditFilter {
            object_name: Some("departments".to_string()),
            ..Default::default()
        },
    )
    .expect("query should succeed");
    assert_eq!(entries.len(), 1);
    assert_eq!(outcome.inserted_rowid, Some(4));
    assert_eq!(entries[0].row_key.as_deref(), Some("4"));
}

// ── AuditAction tests ────────────────────────────────────────────────

#[test]
fn audit_action_parses_labels() {
    assert_eq!("INSERT".parse::<AuditAction>(), Ok(AuditAction::Insert));
    assert_eq!("update".parse::<AuditAction>(), Ok(AuditAction::Update));
    assert!("TRUNCATE".parse::<AuditAction>().is_err());
    assert_eq!(AuditAction::from(MutationKind::Delete), AuditAction::Delete);
    assert_eq!(AuditAction::Delete.to_string(), "DELETE");
}
