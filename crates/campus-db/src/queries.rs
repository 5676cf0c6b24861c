//! The named analytical queries and their expected result shapes.
//!
//! Every query is recomputed against current state on each call. Before a
//! query runs, the prepared statement's column names are compared with the
//! declared shape so a drifting schema fails loudly instead of returning
//! misaligned rows.

use std::str::FromStr;

use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use crate::error::DbError;
use crate::value::Value;

/// Names of the catalog queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryName {
    EnrollmentListing,
    CourseEnrollmentCounts,
    StudentsWithManyCourses,
    AverageGpaPerCourse,
    StudentsWithoutEnrollments,
    CoursesWithoutStudents,
    StudentsByBirthDate,
    TotalCreditsPerStudent,
    DepartmentHeadcount,
    AverageSalaryPerDepartment,
}

impl QueryName {
    pub const ALL: [QueryName; 10] = [
        Self::EnrollmentListing,
        Self::CourseEnrollmentCounts,
        Self::StudentsWithManyCourses,
        Self::AverageGpaPerCourse,
        Self::StudentsWithoutEnrollments,
        Self::CoursesWithoutStudents,
        Self::StudentsByBirthDate,
        Self::TotalCreditsPerStudent,
        Self::DepartmentHeadcount,
        Self::AverageSalaryPerDepartment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnrollmentListing => "enrollment_listing",
            Self::CourseEnrollmentCounts => "course_enrollment_counts",
            Self::StudentsWithManyCourses => "students_with_many_courses",
            Self::AverageGpaPerCourse => "average_gpa_per_course",
            Self::StudentsWithoutEnrollments => "students_without_enrollments",
            Self::CoursesWithoutStudents => "courses_without_students",
            Self::StudentsByBirthDate => "students_by_birth_date",
            Self::TotalCreditsPerStudent => "total_credits_per_student",
            Self::DepartmentHeadcount => "department_headcount",
            Self::AverageSalaryPerDepartment => "average_salary_per_department",
        }
    }
}

impl std::fmt::Display for QueryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryName {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| DbError::UnknownQuery(s.to_string()))
    }
}

/// A positional integer parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamDef {
    pub name: &'static str,
    pub description: &'static str,
    /// Bound when the caller omits the parameter.
    pub default: i64,
}

/// A catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryDef {
    pub name: QueryName,
    pub description: &'static str,
    #[serde(skip)]
    pub sql: &'static str,
    /// Expected result columns, in order.
    pub columns: &'static [&'static str],
    pub params: &'static [ParamDef],
}

const MIN_COURSES: ParamDef = ParamDef {
    name: "min_courses",
    description: "students must be enrolled in more than this many courses",
    default: 2,
};

const CATALOG: [QueryDef; 10] = [
    QueryDef {
        name: QueryName::EnrollmentListing,
        description: "every enrollment with student and course names",
        sql: "SELECT s.student_id AS student_id,
                     s.first_name || ' ' || s.last_name AS student_name,
                     c.course_id AS course_id,
                     c.title AS course_title,
                     e.grade AS grade
              FROM enrollments e
              JOIN students s ON s.student_id = e.student_id
              JOIN courses c ON c.course_id = e.course_id
              ORDER BY e.student_id, e.course_id",
        columns: &["student_id", "student_name", "course_id", "course_title", "grade"],
        params: &[],
    },
    QueryDef {
        name: QueryName::CourseEnrollmentCounts,
        description: "number of students enrolled per course, including empty courses",
        sql: "SELECT c.course_id AS course_id,
                     c.title AS title,
                     COUNT(e.student_id) AS enrollment_count
              FROM courses c
              LEFT JOIN enrollments e ON e.course_id = c.course_id
              GROUP BY c.course_id, c.title
              ORDER BY c.course_id",
        columns: &["course_id", "title", "enrollment_count"],
        params: &[],
    },
    QueryDef {
        name: QueryName::StudentsWithManyCourses,
        description: "students enrolled in more than min_courses courses, most first",
        sql: "SELECT s.student_id AS student_id,
                     s.first_name || ' ' || s.last_name AS student_name,
                     COUNT(*) AS course_count
              FROM students s
              JOIN enrollments e ON e.student_id = s.student_id
              GROUP BY s.student_id, s.first_name, s.last_name
              HAVING COUNT(*) > ?1
              ORDER BY course_count DESC, s.student_id",
        columns: &["student_id", "student_name", "course_count"],
        params: &[MIN_COURSES],
    },
    QueryDef {
        name: QueryName::AverageGpaPerCourse,
        description: "mean grade points over graded enrollments; NULL when none are graded",
        sql: "SELECT c.course_id AS course_id,
                     c.title AS title,
                     AVG(grade_points(e.grade)) AS average_gpa,
                     COUNT(e.grade) AS graded_count
              FROM courses c
              LEFT JOIN enrollments e ON e.course_id = c.course_id
              GROUP BY c.course_id, c.title
              ORDER BY c.course_id",
        columns: &["course_id", "title", "average_gpa", "graded_count"],
        params: &[],
    },
    QueryDef {
        name: QueryName::StudentsWithoutEnrollments,
        description: "students not enrolled in any course",
        sql: "SELECT s.student_id AS student_id,
                     s.first_name || ' ' || s.last_name AS student_name
              FROM students s
              WHERE NOT EXISTS (
                  SELECT 1 FROM enrollments e WHERE e.student_id = s.student_id
              )
              ORDER BY s.student_id",
        columns: &["student_id", "student_name"],
        params: &[],
    },
    QueryDef {
        name: QueryName::CoursesWithoutStudents,
        description: "courses nobody is enrolled in",
        sql: "SELECT c.course_id AS course_id,
                     c.title AS title
              FROM courses c
              WHERE NOT EXISTS (
                  SELECT 1 FROM enrollments e WHERE e.course_id = c.course_id
              )
              ORDER BY c.course_id",
        columns: &["course_id", "title"],
        params: &[],
    },
    QueryDef {
        name: QueryName::StudentsByBirthDate,
        description: "students ordered from oldest to youngest",
        sql: "SELECT s.student_id AS student_id,
                     s.first_name || ' ' || s.last_name AS student_name,
                     s.date_of_birth AS date_of_birth
              FROM students s
              ORDER BY s.date_of_birth, s.student_id",
        columns: &["student_id", "student_name", "date_of_birth"],
        params: &[],
    },
    QueryDef {
        name: QueryName::TotalCreditsPerStudent,
        description: "sum of credits over each student's courses, 0 when not enrolled",
        sql: "SELECT s.student_id AS student_id,
                     s.first_name || ' ' || s.last_name AS student_name,
                     COALESCE(SUM(c.credits), 0) AS total_credits
              FROM students s
              LEFT JOIN enrollments e ON e.student_id = s.student_id
              LEFT JOIN courses c ON c.course_id = e.course_id
              GROUP BY s.student_id, s.first_name, s.last_name
              ORDER BY s.student_id",
        columns: &["student_id", "student_name", "total_credits"],
        params: &[],
    },
    QueryDef {
        name: QueryName::DepartmentHeadcount,
        description: "number of employees per department, including empty departments",
        sql: "SELECT d.department_id AS department_id,
                     d.name AS name,
                     COUNT(emp.employee_id) AS headcount
              FROM departments d
              LEFT JOIN employees emp ON emp.department_id = d.department_id
              GROUP BY d.department_id, d.name
              ORDER BY d.department_id",
        columns: &["department_id", "name", "headcount"],
        params: &[],
    },
    QueryDef {
        name: QueryName::AverageSalaryPerDepartment,
        description: "total salary divided by headcount; NULL for a department without employees",
        sql: "SELECT d.department_id AS department_id,
                     d.name AS name,
                     safe_divide(COALESCE(SUM(emp.salary), 0), COUNT(emp.employee_id))
                         AS average_salary
              FROM departments d
              LEFT JOIN employees emp ON emp.department_id = d.department_id
              GROUP BY d.department_id, d.name
              ORDER BY d.department_id",
        columns: &["department_id", "name", "average_salary"],
        params: &[],
    },
];

/// Returns every catalog entry, in catalog order.
pub fn catalog() -> &'static [QueryDef] {
    &CATALOG
}

/// Returns the catalog entry for `name`.
pub fn definition(name: QueryName) -> &'static QueryDef {
    // CATALOG is declared in QueryName::ALL order.
    &CATALOG[name as usize]
}

/// Rows returned by a catalog query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns every value of column `name`, top to bottom. Empty if the
    /// column does not exist.
    pub fn column(&self, name: &str) -> Vec<&Value> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().map(|row| &row[idx]).collect(),
            None => Vec::new(),
        }
    }
}

/// Runs the catalog query `name` with positional `args`.
///
/// Missing trailing parameters take their declared defaults.
///
/// # Errors
///
/// - `DbError::InvalidParameters` for too many or non-integer arguments.
/// - `DbError::ShapeMismatch` if the statement's columns differ from the
///   declared shape.
pub fn run_query(conn: &Connection, name: QueryName, args: &[Value]) -> Result<QueryResult, DbError> {
    run_definition(conn, definition(name), args)
}

/// Parses `name` and runs it; see [`run_query`].
///
/// # Errors
///
/// Returns `DbError::UnknownQuery` if `name` is not in the catalog.
pub fn run_named(conn: &Connection, name: &str, args: &[Value]) -> Result<QueryResult, DbError> {
    run_query(conn, name.parse()?, args)
}

/// Runs an arbitrary query definition with the same checks as [`run_query`].
///
/// # Errors
///
/// See [`run_query`].
pub fn run_definition(
    conn: &Connection,
    def: &QueryDef,
    args: &[Value],
) -> Result<QueryResult, DbError> {
    let bound = bind_params(def, args)?;

    let mut stmt = conn.prepare(def.sql)?;
    let actual: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    if actual != def.columns {
        return Err(DbError::ShapeMismatch {
            query: def.name.to_string(),
            expected: def.columns.iter().map(|c| c.to_string()).collect(),
            actual,
        });
    }

    let width = actual.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.query(params_from_iter(bound.iter()))?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(Value::from(row.get_ref(idx)?));
        }
        rows.push(values);
    }

    tracing::debug!(query = def.name.as_str(), rows = rows.len(), "query executed");

    Ok(QueryResult {
        query: def.name.to_string(),
        columns: actual,
        rows,
    })
}

fn bind_params(def: &QueryDef, args: &[Value]) -> Result<Vec<Value>, DbError> {
    if args.len() > def.params.len() {
        return Err(DbError::InvalidParameters {
            query: def.name.to_string(),
            reason: format!(
                "expected at most {} parameter(s), got {}",
                def.params.len(),
                args.len()
            ),
        });
    }

    def.params
        .iter()
        .enumerate()
        .map(|(idx, param)| match args.get(idx) {
            None => Ok(Value::Integer(param.default)),
            Some(Value::Integer(v)) => Ok(Value::Integer(*v)),
            Some(other) => Err(DbError::InvalidParameters {
                query: def.name.to_string(),
                reason: format!("{} must be an integer, got {other:?}", param.name),
            }),
        })
        .collect()
}
