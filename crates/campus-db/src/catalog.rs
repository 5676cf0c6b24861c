//! Table definitions for the campus teaching schema.
//!
//! | Table | Key | References |
//! |-------|-----|------------|
//! | `students` | `student_id` | |
//! | `courses` | `course_id` | `departments` |
//! | `enrollments` | `(student_id, course_id)` | `students`, `courses` |
//! | `departments` | `department_id` | |
//! | `employees` | `employee_id` | `departments`, `employees` (manager) |
//! | `documents` | `document_id` (autoincrement) | |
//! | `products` | `product_id` | |
//! | `audit_log` | `id` (autoincrement) | |
//! | `access_grants` | `(role, privilege, object_name)` | |
//! | `role_members` | `(actor, role)` | |
//!
//! Tables are declared here in reading order, not creation order;
//! [`crate::SchemaManager`] sorts them.

use crate::schema::{ColumnDef, ColumnType, ForeignKeyDef, OnDelete, TableDef};

/// Table name constants.
pub mod tables {
    pub const STUDENTS: &str = "students";
    pub const COURSES: &str = "courses";
    pub const ENROLLMENTS: &str = "enrollments";
    pub const DEPARTMENTS: &str = "departments";
    pub const EMPLOYEES: &str = "employees";
    pub const DOCUMENTS: &str = "documents";
    pub const PRODUCTS: &str = "products";
    pub const AUDIT_LOG: &str = "audit_log";
    pub const ACCESS_GRANTS: &str = "access_grants";
    pub const ROLE_MEMBERS: &str = "role_members";
    /// The schema tracking table. Grants on it gate schema administration.
    pub const SCHEMA: &str = "_campus_schema";
}

/// Tables whose rows survive a drop-and-recreate of the schema.
pub const PRESERVED_TABLES: &[&str] = &[tables::AUDIT_LOG];

/// Domain tables whose mutations are audited by default.
pub const MONITORED_TABLES: &[&str] = &[
    tables::STUDENTS,
    tables::COURSES,
    tables::ENROLLMENTS,
    tables::DEPARTMENTS,
    tables::EMPLOYEES,
    tables::DOCUMENTS,
];

/// Returns every table of the campus schema.
pub fn campus_tables() -> Vec<TableDef> {
    use ColumnType::*;

    vec![
        TableDef::new(tables::STUDENTS)
            .column(ColumnDef::new("student_id", Integer).not_null())
            .column(ColumnDef::new("first_name", Text).not_null())
            .column(ColumnDef::new("last_name", Text).not_null())
            .column(ColumnDef::new("date_of_birth", Date).not_null())
            .column(ColumnDef::new("email", Text).not_null().unique())
            .column(
                ColumnDef::new("phone_numbers", List)
                    .not_null()
                    .default_expr("'[]'")
                    .check("json_valid(phone_numbers) AND json_type(phone_numbers) = 'array'"),
            )
            .primary_key(&["student_id"]),
        TableDef::new(tables::COURSES)
            .column(ColumnDef::new("course_id", Integer).not_null())
            .column(ColumnDef::new("title", Text).not_null())
            .column(ColumnDef::new("credits", Integer).not_null().check("credits > 0"))
            .column(ColumnDef::new("department_id", Integer))
            .primary_key(&["course_id"])
            .foreign_key(
                ForeignKeyDef::new(&["department_id"], tables::DEPARTMENTS, &["department_id"])
                    .on_delete(OnDelete::SetNull),
            ),
        TableDef::new(tables::ENROLLMENTS)
            .column(ColumnDef::new("student_id", Integer).not_null())
            .column(ColumnDef::new("course_id", Integer).not_null())
            .column(
                ColumnDef::new("enrolled_on", Date)
                    .not_null()
                    .default_expr("(date('now'))"),
            )
            .column(
                ColumnDef::new("grade", Text).check("grade IN ('A', 'B', 'C', 'D', 'F')"),
            )
            .primary_key(&["student_id", "course_id"])
            .foreign_key(
                ForeignKeyDef::new(&["student_id"], tables::STUDENTS, &["student_id"])
                    .on_delete(OnDelete::Cascade),
            )
            .foreign_key(
                ForeignKeyDef::new(&["course_id"], tables::COURSES, &["course_id"])
                    .on_delete(OnDelete::Cascade),
            ),
        TableDef::new(tables::DEPARTMENTS)
            .column(ColumnDef::new("department_id", Integer).not_null())
            .column(ColumnDef::new("name", Text).not_null().unique())
            .column(ColumnDef::new("location", Text).not_null())
            .primary_key(&["department_id"]),
        TableDef::new(tables::EMPLOYEES)
            .column(ColumnDef::new("employee_id", Integer).not_null())
            .column(ColumnDef::new("first_name", Text).not_null())
            .column(ColumnDef::new("last_name", Text).not_null())
            .column(ColumnDef::new("department_id", Integer))
            .column(ColumnDef::new("manager_id", Integer))
            .column(ColumnDef::new("salary", Real).not_null().check("salary > 0"))
            .column(ColumnDef::new("hire_date", Date).not_null())
            .column(
                ColumnDef::new("address", Record)
                    .not_null()
                    .default_expr("'{}'")
                    .check("json_valid(address) AND json_type(address) = 'object'"),
            )
            .primary_key(&["employee_id"])
            .foreign_key(
                ForeignKeyDef::new(&["department_id"], tables::DEPARTMENTS, &["department_id"])
                    .on_delete(OnDelete::SetNull),
            )
            .foreign_key(
                ForeignKeyDef::new(&["manager_id"], tables::EMPLOYEES, &["employee_id"])
                    .on_delete(OnDelete::SetNull),
            )
            .check("manager_id IS NULL OR manager_id <> employee_id"),
        TableDef::new(tables::DOCUMENTS)
            .column(ColumnDef::new("document_id", Integer).auto_increment())
            .column(ColumnDef::new("title", Text).not_null())
            .column(
                ColumnDef::new("mime_type", Text)
                    .not_null()
                    .default_expr("'application/octet-stream'"),
            )
            .column(ColumnDef::new("content", Blob).not_null())
            .column(
                ColumnDef::new("sha256_hex", Text)
                    .not_null()
                    .check("length(sha256_hex) = 64"),
            )
            .column(ColumnDef::new("signature_hex", Text))
            .column(ColumnDef::new("public_key_hex", Text))
            .column(
                ColumnDef::new("created_at", Text)
                    .not_null()
                    .default_expr("(datetime('now'))"),
            )
            .check("(signature_hex IS NULL) = (public_key_hex IS NULL)"),
        TableDef::new(tables::PRODUCTS)
            .column(ColumnDef::new("product_id", Integer).not_null())
            .column(ColumnDef::new("name", Text).not_null())
            .column(ColumnDef::new("details_xml", Xml).not_null())
            .primary_key(&["product_id"]),
        TableDef::new(tables::AUDIT_LOG)
            .column(ColumnDef::new("id", Integer).auto_increment())
            .column(ColumnDef::new("seq", Integer).not_null().unique())
            .column(ColumnDef::new("actor", Text).not_null())
            .column(
                ColumnDef::new("action", Text)
                    .not_null()
                    .check("action IN ('INSERT', 'UPDATE', 'DELETE')"),
            )
            .column(ColumnDef::new("object_name", Text).not_null())
            .column(ColumnDef::new("row_key", Text))
            .column(ColumnDef::new("details_json", Text).not_null().default_expr("'{}'"))
            .column(
                ColumnDef::new("occurred_at", Text)
                    .not_null()
                    .default_expr("(datetime('now'))"),
            ),
        TableDef::new(tables::ACCESS_GRANTS)
            .column(ColumnDef::new("role", Text).not_null())
            .column(
                ColumnDef::new("privilege", Text)
                    .not_null()
                    .check("privilege IN ('SELECT', 'INSERT', 'UPDATE', 'DELETE', 'ALL')"),
            )
            .column(ColumnDef::new("object_name", Text).not_null())
            .column(
                ColumnDef::new("granted_at", Text)
                    .not_null()
                    .default_expr("(datetime('now'))"),
            )
            .primary_key(&["role", "privilege", "object_name"]),
        TableDef::new(tables::ROLE_MEMBERS)
            .column(ColumnDef::new("actor", Text).not_null())
            .column(ColumnDef::new("role", Text).not_null())
            .primary_key(&["actor", "role"]),
    ]
}
