//! Domain records, one struct per table.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Grade;

/// A student row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    /// Unique across all students.
    pub email: String,
    /// Stored as a JSON array in a single column.
    #[serde(default)]
    pub phone_numbers: Vec<String>,
}

impl Student {
    /// Returns "First Last".
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A course row. `credits` must be strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: i64,
    pub title: String,
    pub credits: i64,
    pub department_id: Option<i64>,
}

/// The student/course join row. `(student_id, course_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: i64,
    pub course_id: i64,
    pub enrolled_on: NaiveDate,
    /// `None` until the course is graded.
    pub grade: Option<Grade>,
}

/// A department row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub department_id: i64,
    pub name: String,
    pub location: String,
}

/// Postal address, stored as a JSON object in `employees.address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub postal_code: String,
}

/// An employee row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub department_id: Option<i64>,
    /// References another employee; managers are inserted before reports.
    pub manager_id: Option<i64>,
    pub salary: f64,
    pub hire_date: NaiveDate,
    pub address: Address,
}

/// Input for storing a new document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

/// A stored document including its binary payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: i64,
    pub title: String,
    pub mime_type: String,
    pub content: Vec<u8>,
    /// Hex-encoded SHA-256 of `content`, computed on store.
    pub sha256_hex: String,
    /// Hex-encoded Ed25519 signature over the digest, once signed.
    pub signature_hex: Option<String>,
    /// Hex-encoded public key of the signer.
    pub public_key_hex: Option<String>,
    pub created_at: String,
}

/// A product row. `details_xml` is the raw XML description document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: i64,
    pub name: String,
    pub details_xml: String,
}

/// Hardware specs extracted from a product's XML description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSpecs {
    pub product_id: i64,
    pub name: String,
    pub brand: Option<String>,
    pub cpu: String,
    pub ram: String,
    pub storage: String,
}

/// Document metadata without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: i64,
    pub title: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub sha256_hex: String,
    pub signed: bool,
    pub created_at: String,
}
