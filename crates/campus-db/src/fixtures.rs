//! Sample rows for the campus schema and the loader that inserts them.
//!
//! The loader inserts tables in foreign-key order (departments, employees,
//! students, courses, enrollments, documents, products, then access grants)
//! inside a single transaction. Constraint failures are not pre-checked; SQLite
//! reports them and they surface as [`DbError::ConstraintViolation`], with
//! nothing from the failed load left behind.

use campus_types::{
    Address, Course, Department, Employee, Enrollment, Grade, NewDocument, Privilege, Product,
    Student,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::access::{self, Grant, PUBLIC_ROLE};
use crate::catalog::tables;
use crate::documents;
use crate::error::DbError;
use crate::products;

/// A complete set of rows to load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureSet {
    pub departments: Vec<Department>,
    /// Managers must precede the employees that report to them.
    pub employees: Vec<Employee>,
    pub students: Vec<Student>,
    pub courses: Vec<Course>,
    pub enrollments: Vec<Enrollment>,
    pub documents: Vec<NewDocument>,
    pub products: Vec<Product>,
    pub grants: Vec<Grant>,
    /// `(actor, role)` pairs.
    pub role_members: Vec<(String, String)>,
}

/// Row counts inserted per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FixtureReport {
    pub departments: usize,
    pub employees: usize,
    pub students: usize,
    pub courses: usize,
    pub enrollments: usize,
    pub documents: usize,
    pub products: usize,
    pub grants: usize,
    pub role_members: usize,
}

impl FixtureReport {
    pub fn total(&self) -> usize {
        self.departments
            + self.employees
            + self.students
            + self.courses
            + self.enrollments
            + self.documents
            + self.products
            + self.grants
            + self.role_members
    }
}

/// Inserts every row of `fixtures` in foreign-key order, atomically.
///
/// # Errors
///
/// Returns `DbError::ConstraintViolation` for the first row SQLite rejects
/// (including primary-key reuse when loading twice), or
/// `DbError::Encoding` if a list/record column cannot be serialised.
pub fn load_fixtures(conn: &Connection, fixtures: &FixtureSet) -> Result<FixtureReport, DbError> {
    let tx = conn.unchecked_transaction()?;
    let mut report = FixtureReport::default();

    for department in &fixtures.departments {
        insert_department(&tx, department)?;
        report.departments += 1;
    }
    for employee in &fixtures.employees {
        insert_employee(&tx, employee)?;
        report.employees += 1;
    }
    for student in &fixtures.students {
        insert_student(&tx, student)?;
        report.students += 1;
    }
    for course in &fixtures.courses {
        insert_course(&tx, course)?;
        report.courses += 1;
    }
    for enrollment in &fixtures.enrollments {
        insert_enrollment(&tx, enrollment)?;
        report.enrollments += 1;
    }
    for document in &fixtures.documents {
        documents::insert_document_row(&tx, document)?;
        report.documents += 1;
    }
    for product in &fixtures.products {
        products::insert_product(&tx, product)?;
        report.products += 1;
    }
    for grant in &fixtures.grants {
        access::grant(&tx, &grant.role, grant.privilege, &grant.object_name)?;
        report.grants += 1;
    }
    for (actor, role) in &fixtures.role_members {
        access::assign_role(&tx, actor, role)?;
        report.role_members += 1;
    }

    tx.commit()?;

    tracing::info!(rows = report.total(), "fixtures loaded");
    Ok(report)
}

/// Inserts one department.
///
/// # Errors
///
/// Returns `DbError::ConstraintViolation` if SQLite rejects the row.
pub fn insert_department(conn: &Connection, department: &Department) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO departments (department_id, name, location) VALUES (?1, ?2, ?3)",
        params![department.department_id, department.name, department.location],
    )
    .map_err(|e| DbError::classify(tables::DEPARTMENTS, e))?;
    Ok(())
}

/// Inserts one employee; `address` is stored as a JSON object.
///
/// # Errors
///
/// Returns `DbError::ConstraintViolation` if SQLite rejects the row.
pub fn insert_employee(conn: &Connection, employee: &Employee) -> Result<(), DbError> {
    let address = serde_json::to_string(&employee.address)?;
    conn.execute(
        "INSERT INTO employees
            (employee_id, first_name, last_name, department_id, manager_id, salary, hire_date, address)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            employee.employee_id,
            employee.first_name,
            employee.last_name,
            employee.department_id,
            employee.manager_id,
            employee.salary,
            employee.hire_date,
            address,
        ],
    )
    .map_err(|e| DbError::classify(tables::EMPLOYEES, e))?;
    Ok(())
}

/// Inserts one student; `phone_numbers` is stored as a JSON array.
///
/// # Errors
///
/// Returns `DbError::ConstraintViolation` if SQLite rejects the row.
pub fn insert_student(conn: &Connection, student: &Student) -> Result<(), DbError> {
    let phones = serde_json::to_string(&student.phone_numbers)?;
    conn.execute(
        "INSERT INTO students
            (student_id, first_name, last_name, date_of_birth, email, phone_numbers)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            student.student_id,
            student.first_name,
            student.last_name,
            student.date_of_birth,
            student.email,
            phones,
        ],
    )
    .map_err(|e| DbError::classify(tables::STUDENTS, e))?;
    Ok(())
}

/// Inserts one course.
///
/// # Errors
///
/// Returns `DbError::ConstraintViolation` if SQLite rejects the row
/// (including `credits <= 0`).
pub fn insert_course(conn: &Connection, course: &Course) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO courses (course_id, title, credits, department_id) VALUES (?1, ?2, ?3, ?4)",
        params![
            course.course_id,
            course.title,
            course.credits,
            course.department_id
        ],
    )
    .map_err(|e| DbError::classify(tables::COURSES, e))?;
    Ok(())
}

/// Inserts one enrollment without auditing; used for setup.
///
/// # Errors
///
/// Returns `DbError::ConstraintViolation` if SQLite rejects the row.
pub fn insert_enrollment(conn: &Connection, enrollment: &Enrollment) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO enrollments (student_id, course_id, enrolled_on, grade)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            enrollment.student_id,
            enrollment.course_id,
            enrollment.enrolled_on,
            enrollment.grade.map(Grade::as_str),
        ],
    )
    .map_err(|e| DbError::classify(tables::ENROLLMENTS, e))?;
    Ok(())
}

/// Reads a student back, decoding the phone-number list.
///
/// # Errors
///
/// Returns `DbError::NotFound` if no such student exists.
pub fn fetch_student(conn: &Connection, student_id: i64) -> Result<Student, DbError> {
    use rusqlite::OptionalExtension;

    let row = conn
        .query_row(
            "SELECT student_id, first_name, last_name, date_of_birth, email, phone_numbers
             FROM students WHERE student_id = ?1",
            [student_id],
            |row| {
                Ok((
                    Student {
                        student_id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        date_of_birth: row.get(3)?,
                        email: row.get(4)?,
                        phone_numbers: Vec::new(),
                    },
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let (mut student, phones) = row.ok_or_else(|| DbError::NotFound {
        entity: "student",
        key: student_id.to_string(),
    })?;
    student.phone_numbers = serde_json::from_str(&phones)?;
    Ok(student)
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    // Only called with the literal dates below.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn student(id: i64, first: &str, last: &str, born: NaiveDate, phones: &[&str]) -> Student {
    Student {
        student_id: id,
        first_name: first.to_string(),
        last_name: last.to_string(),
        date_of_birth: born,
        email: format!("{}.{}@campus.edu", first.to_lowercase(), last.to_lowercase()),
        phone_numbers: phones.iter().map(|p| p.to_string()).collect(),
    }
}

fn course(id: i64, title: &str, credits: i64, department_id: i64) -> Course {
    Course {
        course_id: id,
        title: title.to_string(),
        credits,
        department_id: Some(department_id),
    }
}

fn enrollment(student_id: i64, course_id: i64, grade: Option<Grade>) -> Enrollment {
    Enrollment {
        student_id,
        course_id,
        enrolled_on: date(2024, 9, 2),
        grade,
    }
}

#[allow(clippy::too_many_arguments)]
fn employee(
    id: i64,
    first: &str,
    last: &str,
    department_id: Option<i64>,
    manager_id: Option<i64>,
    salary: f64,
    hired: NaiveDate,
    city: &str,
) -> Employee {
    Employee {
        employee_id: id,
        first_name: first.to_string(),
        last_name: last.to_string(),
        department_id,
        manager_id,
        salary,
        hire_date: hired,
        address: Address {
            street: format!("{} Campus Way", id * 10),
            city: city.to_string(),
            postal_code: format!("{:05}", 10_000 + id),
        },
    }
}

/// The fixed teaching data set.
///
/// Five students, five courses, and ten enrollments: student 5 takes three
/// courses, everyone else one or two, and course 105 has no students. Course
/// 104 has one ungraded enrollment. Department 3 has no employees.
pub fn sample_fixtures() -> FixtureSet {
    use Grade::*;

    let departments = vec![
        Department {
            department_id: 1,
            name: "Computer Science".to_string(),
            location: "Building A".to_string(),
        },
        Department {
            department_id: 2,
            name: "Mathematics".to_string(),
            location: "Building B".to_string(),
        },
        Department {
            department_id: 3,
            name: "Library Services".to_string(),
            location: "Building C".to_string(),
        },
    ];

    let employees = vec![
        employee(1, "Grace", "Hopper", Some(1), None, 98_000.0, date(2015, 1, 12), "Arlington"),
        employee(2, "Alan", "Turing", Some(1), Some(1), 87_500.0, date(2017, 6, 1), "Bletchley"),
        employee(3, "Ada", "Lovelace", Some(1), Some(1), 82_000.0, date(2019, 3, 18), "London"),
        employee(4, "Emmy", "Noether", Some(2), None, 91_000.0, date(2016, 9, 5), "Erlangen"),
        employee(5, "Kurt", "Godel", Some(2), Some(4), 76_000.0, date(2020, 2, 24), "Brno"),
        employee(6, "Edsger", "Dijkstra", None, None, 64_000.0, date(2022, 8, 15), "Rotterdam"),
    ];

    let students = vec![
        student(1, "Alice", "Johnson", date(2002, 4, 15), &["555-0101"]),
        student(2, "Brian", "Smith", date(2001, 9, 23), &["555-0102", "555-0199"]),
        student(3, "Chloe", "Davis", date(2003, 1, 10), &[]),
        student(4, "Daniel", "Martinez", date(2002, 11, 30), &["555-0104"]),
        student(5, "Emma", "Wilson", date(2001, 6, 5), &["555-0105"]),
    ];

    let courses = vec![
        course(101, "Database Systems", 4, 1),
        course(102, "Operating Systems", 3, 1),
        course(103, "Data Structures", 4, 1),
        course(104, "Linear Algebra", 3, 2),
        course(105, "Discrete Mathematics", 3, 2),
    ];

    let enrollments = vec![
        enrollment(1, 101, Some(A)),
        enrollment(1, 103, Some(B)),
        enrollment(2, 101, Some(B)),
        enrollment(2, 102, Some(C)),
        enrollment(3, 103, Some(A)),
        enrollment(3, 104, None),
        enrollment(4, 102, Some(B)),
        enrollment(5, 101, Some(A)),
        enrollment(5, 102, Some(B)),
        enrollment(5, 104, Some(C)),
    ];

    let documents = vec![
        NewDocument {
            title: "Course catalog".to_string(),
            mime_type: "text/plain".to_string(),
            content: b"101 Database Systems\n102 Operating Systems\n103 Data Structures\n".to_vec(),
        },
        NewDocument {
            title: "Campus logo".to_string(),
            mime_type: "image/png".to_string(),
            content: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
        },
    ];

    let products = vec![
        Product {
            product_id: 1,
            name: "Laptop".to_string(),
            details_xml: r#"<?xml version="1.0"?><product><brand>XYZ</brand><specs><cpu>Intel i7</cpu><ram>16GB</ram><storage>512GB SSD</storage></specs></product>"#.to_string(),
        },
        Product {
            product_id: 2,
            name: "Smartphone".to_string(),
            details_xml: r#"<?xml version="1.0"?><product><brand>ABC</brand><specs><cpu>Snapdragon 888</cpu><ram>8GB</ram><storage>256GB</storage></specs></product>"#.to_string(),
        },
    ];

    let mut grants = Vec::new();
    for table in [tables::STUDENTS, tables::COURSES, tables::ENROLLMENTS] {
        grants.push(Grant::new("registrar", Privilege::All, table));
        grants.push(Grant::new(PUBLIC_ROLE, Privilege::Select, table));
    }
    for table in [tables::EMPLOYEES, tables::DEPARTMENTS] {
        grants.push(Grant::new("hr", Privilege::All, table));
    }
    grants.push(Grant::new(PUBLIC_ROLE, Privilege::Select, tables::DEPARTMENTS));
    grants.push(Grant::new(PUBLIC_ROLE, Privilege::Select, tables::PRODUCTS));
    for privilege in [Privilege::Select, Privilege::Insert, Privilege::Update] {
        grants.push(Grant::new("archivist", privilege, tables::DOCUMENTS));
    }
    grants.push(Grant::new("dba", Privilege::All, tables::SCHEMA));

    let role_members = [
        ("alice.registrar", "registrar"),
        ("henry.hr", "hr"),
        ("dora.archivist", "archivist"),
        ("admin", "registrar"),
        ("admin", "hr"),
        ("admin", "archivist"),
        ("admin", "dba"),
    ]
    .iter()
    .map(|(actor, role)| (actor.to_string(), role.to_string()))
    .collect();

    FixtureSet {
        departments,
        employees,
        students,
        courses,
        enrollments,
        documents,
        products,
        grants,
        role_members,
    }
}
