use campus_db::{
    create_pool, enroll_student, load_fixtures, recorded_tables, run_named, run_query,
    sample_fixtures, setup, setup_as, DbError, DbRuntimeSettings, NoopObserver, QueryName,
    RerunPolicy, Value,
};
use campus_types::{Enrollment, Grade, Student};
use chrono::NaiveDate;

fn pooled_setup() -> campus_db::DbPool {
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    setup(&conn, RerunPolicy::FailIfExists).expect("setup should succeed");
    pool
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn setup_creates_every_table_and_records_it() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");

    let recorded = recorded_tables(&conn).expect("tracking table should be readable");
    assert_eq!(recorded.len(), 10);
    assert!(recorded.iter().any(|t| t == "enrollments"));

    // Verify table count (excluding sqlite_sequence and the tracking table)
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='table'
             AND name NOT LIKE 'sqlite_%' AND name <> '_campus_schema'",
        )
        .expect("failed to prepare table list query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to execute table list query")
        .map(|r| r.expect("failed to read table name"))
        .collect();
    assert_eq!(tables.len(), 10);
}

#[test]
fn setup_rerun_follows_policy() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");

    let err = setup(&conn, RerunPolicy::FailIfExists).expect_err("second setup should fail");
    assert!(matches!(err, DbError::AlreadyExists(_)), "unexpected error: {err:?}");

    let report = setup(&conn, RerunPolicy::DropExisting).expect("drop-and-recreate should work");
    assert_eq!(report.enrollments, 10);
}

fn audit_rows(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
        .expect("should count audit rows")
}

#[test]
fn drop_existing_keeps_the_audit_log() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");
    conn.execute(
        "INSERT INTO audit_log (seq, actor, action, object_name) VALUES (1, 'admin', 'INSERT', 'enrollments')",
        [],
    )
    .expect("should write an audit row");

    setup(&conn, RerunPolicy::DropExisting).expect("drop-and-recreate should work");
    assert_eq!(audit_rows(&conn), 1);
    assert_eq!(recorded_tables(&conn).expect("should list").len(), 10);
}

#[test]
fn setup_as_requires_schema_grant_once_grants_exist() {
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");

    setup_as(&conn, "anyone", RerunPolicy::FailIfExists).expect("first setup is open");

    let err = setup_as(&conn, "mallory", RerunPolicy::DropExisting)
        .expect_err("ungranted actor cannot reset the schema");
    assert!(matches!(err, DbError::PermissionDenied { .. }), "unexpected error: {err:?}");
    let students: i64 = conn
        .query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))
        .expect("students table should survive");
    assert_eq!(students, 5);

    let err = setup_as(&conn, "alice.registrar", RerunPolicy::DropExisting)
        .expect_err("table grants do not cover the schema");
    assert!(matches!(err, DbError::PermissionDenied { .. }));

    let report =
        setup_as(&conn, "admin", RerunPolicy::DropExisting).expect("admin holds the dba role");
    assert_eq!(report.students, 5);
}

#[test]
fn fixtures_twice_is_a_constraint_violation() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");

    let err = load_fixtures(&conn, &sample_fixtures()).expect_err("reload should fail");
    assert!(err.is_constraint_violation(), "unexpected error: {err:?}");
}

#[test]
fn students_with_more_than_two_courses_is_student_five() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");

    let result = run_named(&conn, "students_with_many_courses", &[]).expect("query should run");
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0][0], Value::Integer(5));
    assert_eq!(result.rows[0][1], Value::from("Emma Wilson"));
    assert_eq!(result.rows[0][2], Value::Integer(3));
}

#[test]
fn average_gpa_uses_graded_enrollments_only() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");

    let result = run_query(&conn, QueryName::AverageGpaPerCourse, &[]).expect("query should run");
    let averages: Vec<Option<f64>> = result
        .column("average_gpa")
        .into_iter()
        .map(Value::as_f64)
        .collect();

    let expected = [
        Some(11.0 / 3.0), // 101: A, B, A
        Some(8.0 / 3.0),  // 102: C, B, B
        Some(3.5),        // 103: B, A
        Some(2.0),        // 104: C and one ungraded
        None,             // 105: nobody enrolled
    ];
    assert_eq!(averages.len(), expected.len());
    for (actual, expected) in averages.iter().zip(expected) {
        match (actual, expected) {
            (Some(a), Some(e)) => assert!((a - e).abs() < 1e-9, "{a} != {e}"),
            (None, None) => {}
            other => panic!("mismatched averages: {other:?}"),
        }
    }

    // Cross-check against the grade mapping computed in Rust.
    let fixtures = sample_fixtures();
    let points: Vec<f64> = fixtures
        .enrollments
        .iter()
        .filter(|e| e.course_id == 103)
        .filter_map(|e| e.grade.map(Grade::points))
        .collect();
    assert_eq!(points.iter().sum::<f64>() / points.len() as f64, 3.5);
}

#[test]
fn students_without_enrollments_is_the_set_difference() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");

    let empty = run_query(&conn, QueryName::StudentsWithoutEnrollments, &[]).expect("query");
    assert!(empty.is_empty(), "every fixture student is enrolled");

    campus_db::insert_student(
        &conn,
        &Student {
            student_id: 6,
            first_name: "Farah".to_string(),
            last_name: "Khan".to_string(),
            date_of_birth: date(2003, 3, 3),
            email: "farah.khan@campus.edu".to_string(),
            phone_numbers: Vec::new(),
        },
    )
    .expect("insert student 6");

    let result = run_query(&conn, QueryName::StudentsWithoutEnrollments, &[]).expect("query");
    let ids: Vec<i64> = result
        .column("student_id")
        .into_iter()
        .filter_map(Value::as_i64)
        .collect();

    let enrolled: std::collections::BTreeSet<i64> = conn
        .prepare("SELECT DISTINCT student_id FROM enrollments")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .map(|r| r.expect("row"))
        .collect();
    let all: Vec<i64> = conn
        .prepare("SELECT student_id FROM students ORDER BY student_id")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .map(|r| r.expect("row"))
        .collect();
    let difference: Vec<i64> = all.into_iter().filter(|id| !enrolled.contains(id)).collect();

    assert_eq!(ids, difference);
    assert_eq!(ids, vec![6]);
}

#[test]
fn courses_without_students_is_course_105() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");

    let result = run_query(&conn, QueryName::CoursesWithoutStudents, &[]).expect("query");
    assert_eq!(result.column("course_id"), vec![&Value::Integer(105)]);

    let counts = run_query(&conn, QueryName::CourseEnrollmentCounts, &[]).expect("query");
    assert_eq!(
        counts.column("enrollment_count"),
        vec![
            &Value::Integer(3),
            &Value::Integer(3),
            &Value::Integer(2),
            &Value::Integer(2),
            &Value::Integer(0)
        ]
    );
}

#[test]
fn total_credits_grow_with_enrollments() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");

    let credits_of = |student: i64| -> i64 {
        let result = run_query(&conn, QueryName::TotalCreditsPerStudent, &[]).expect("query");
        let idx = result.column_index("total_credits").expect("column exists");
        result
            .rows
            .iter()
            .find(|row| row[0] == Value::Integer(student))
            .and_then(|row| row[idx].as_i64())
            .expect("student is listed")
    };

    // 101 (4) + 102 (3) + 104 (3)
    assert_eq!(credits_of(5), 10);

    let mut previous = credits_of(4);
    for course_id in [101, 103, 105] {
        enroll_student(
            &conn,
            "alice.registrar",
            &Enrollment {
                student_id: 4,
                course_id,
                enrolled_on: date(2025, 1, 15),
                grade: None,
            },
            &NoopObserver,
        )
        .expect("enroll should succeed");

        let current = credits_of(4);
        assert!(current >= previous, "credits went down: {previous} -> {current}");
        previous = current;
    }
    // 102 (3) + 101 (4) + 103 (4) + 105 (3)
    assert_eq!(previous, 14);
}

#[test]
fn safe_divide_is_available_on_pooled_connections() {
    let pool = pooled_setup();
    let conn = pool.get().expect("failed to get connection");

    let (zero, five): (Option<f64>, Option<f64>) = conn
        .query_row("SELECT safe_divide(10, 0), safe_divide(10, 2)", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .expect("should evaluate");
    assert_eq!(zero, None);
    assert_eq!(five, Some(5.0));
    assert_eq!(campus_types::safe_divide(10.0, 0.0), None);
}
