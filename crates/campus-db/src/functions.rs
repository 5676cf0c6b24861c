//! Scalar SQL functions registered on every connection.
//!
//! - `safe_divide(a, b)` returns NULL instead of failing when `b` is zero or
//!   either argument is NULL.
//! - `grade_points(grade)` maps a letter grade to its point value and NULL
//!   (or an unknown letter) to NULL, so `AVG(grade_points(grade))` averages
//!   graded rows only.

use campus_types::{safe_divide, Grade};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

/// Registers the campus scalar functions on `conn`.
///
/// # Errors
///
/// Returns the SQLite error if a function cannot be registered.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("safe_divide", 2, flags, |ctx| {
        let numerator: Option<f64> = ctx.get(0)?;
        let denominator: Option<f64> = ctx.get(1)?;
        Ok(match (numerator, denominator) {
            (Some(n), Some(d)) => safe_divide(n, d),
            _ => None,
        })
    })?;

    conn.create_scalar_function("grade_points", 1, flags, |ctx| {
        let grade: Option<String> = ctx.get(0)?;
        Ok(grade
            .and_then(|g| g.parse::<Grade>().ok())
            .map(Grade::points))
    })?;

    Ok(())
}
