//! Shared types for the Campus teaching database.
//!
//! This crate holds the domain records (students, courses, enrollments,
//! departments, employees, documents, products) and the small value types
//! every other crate agrees on: letter grades with their fixed point
//! mapping, access privileges, and the `safe_divide` helper.
//!
//! Nothing here talks to SQLite. Persistence lives in `campus-db`, which
//! maps these records onto rows.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod records;

pub use records::{
    Address, Course, Department, Document, DocumentSummary, Employee, Enrollment, NewDocument,
    Product, ProductSpecs, Student,
};

/// Letter grades recorded on an enrollment.
///
/// The point mapping is fixed: `A = 4`, `B = 3`, `C = 2`, `D = 1`, `F = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// All grades, best first.
    pub const ALL: [Grade; 5] = [Grade::A, Grade::B, Grade::C, Grade::D, Grade::F];

    /// Returns the grade-point value used for GPA averages.
    pub fn points(self) -> f64 {
        match self {
            Self::A => 4.0,
            Self::B => 3.0,
            Self::C => 2.0,
            Self::D => 1.0,
            Self::F => 0.0,
        }
    }

    /// Returns the single-letter label stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown grade letter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown grade: {0}")]
pub struct ParseGradeError(pub String);

impl std::str::FromStr for Grade {
    type Err = ParseGradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            "C" | "c" => Ok(Self::C),
            "D" | "d" => Ok(Self::D),
            "F" | "f" => Ok(Self::F),
            other => Err(ParseGradeError(other.to_string())),
        }
    }
}

/// Privileges that can be granted to a role on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    /// Every privilege on the object.
    All,
}

impl Privilege {
    /// Returns the canonical upper-case label stored in `access_grants`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::All => "ALL",
        }
    }

    /// Returns true when holding `self` is enough to perform `required`.
    pub fn implies(self, required: Privilege) -> bool {
        self == Self::All || self == required
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown privilege label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown privilege: {0}")]
pub struct ParsePrivilegeError(pub String);

impl std::str::FromStr for Privilege {
    type Err = ParsePrivilegeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SELECT" => Ok(Self::Select),
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "ALL" | "ALL PRIVILEGES" => Ok(Self::All),
            _ => Err(ParsePrivilegeError(s.to_string())),
        }
    }
}

/// Divides `numerator` by `denominator`, returning `None` instead of failing
/// when the denominator is zero.
///
/// ```
/// assert_eq!(campus_types::safe_divide(10.0, 2.0), Some(5.0));
/// assert_eq!(campus_types::safe_divide(10.0, 0.0), None);
/// ```
pub fn safe_divide(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_points_follow_fixed_mapping() {
        let points: Vec<f64> = Grade::ALL.iter().map(|g| g.points()).collect();
        assert_eq!(points, vec![4.0, 3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn grade_parse_accepts_lowercase() {
        assert_eq!("b".parse::<Grade>(), Ok(Grade::B));
        assert_eq!(" A ".parse::<Grade>(), Ok(Grade::A));
        assert!("E".parse::<Grade>().is_err());
        assert!("".parse::<Grade>().is_err());
    }

    #[test]
    fn privilege_all_implies_everything() {
        for p in [
            Privilege::Select,
            Privilege::Insert,
            Privilege::Update,
            Privilege::Delete,
        ] {
            assert!(Privilege::All.implies(p));
            assert!(p.implies(p));
        }
        assert!(!Privilege::Select.implies(Privilege::Insert));
        assert!(!Privilege::Delete.implies(Privilege::All));
    }

    #[test]
    fn privilege_labels() {
        assert_eq!(Privilege::Select.as_str(), "SELECT");
        assert_eq!("all privileges".parse::<Privilege>(), Ok(Privilege::All));
        assert_eq!("update".parse::<Privilege>(), Ok(Privilege::Update));
        assert!("TRUNCATE".parse::<Privilege>().is_err());
    }

    #[test]
    fn safe_divide_by_zero_is_none() {
        assert_eq!(safe_divide(10.0, 0.0), None);
        assert_eq!(safe_divide(10.0, 2.0), Some(5.0));
        assert_eq!(safe_divide(0.0, 4.0), Some(0.0));
    }
}
