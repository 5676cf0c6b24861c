//! Grant/revoke bookkeeping and the authorization check wrapper.
//!
//! Privileges are granted to roles on named objects (tables). Actors hold
//! roles through `role_members`. An actor is also implicitly a role of the
//! same name, and grants to `PUBLIC` apply to everyone. `ALL` covers every
//! privilege.
//!
//! SQLite has no privilege engine of its own, so [`require`] is called by
//! the mutation API before it touches a table.

use campus_types::Privilege;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// The role every actor implicitly belongs to.
pub const PUBLIC_ROLE: &str = "PUBLIC";

/// One row of `access_grants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub role: String,
    pub privilege: Privilege,
    pub object_name: String,
}

impl Grant {
    pub fn new(role: &str, privilege: Privilege, object_name: &str) -> Self {
        Self {
            role: role.to_string(),
            privilege,
            object_name: object_name.to_string(),
        }
    }
}

/// Grants `privilege` on `object_name` to `role`.
///
/// Returns `false` if the grant already existed.
///
/// # Errors
///
/// Returns `DbError::Database` on SQL failure.
pub fn grant(
    conn: &Connection,
    role: &str,
    privilege: Privilege,
    object_name: &str,
) -> Result<bool, DbError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO access_grants (role, privilege, object_name) VALUES (?1, ?2, ?3)",
        params![role, privilege.as_str(), object_name],
    )?;
    if inserted > 0 {
        tracing::info!(role, privilege = privilege.as_str(), object = object_name, "granted");
    }
    Ok(inserted > 0)
}

/// Revokes `privilege` on `object_name` from `role`.
///
/// Revoking `ALL` removes every privilege the role holds on the object.
/// Revoking a single privilege removes only that row; an `ALL` grant stays.
/// Returns `false` if nothing was revoked.
///
/// # Errors
///
/// Returns `DbError::Database` on SQL failure.
pub fn revoke(
    conn: &Connection,
    role: &str,
    privilege: Privilege,
    object_name: &str,
) -> Result<bool, DbError> {
    let removed = if privilege == Privilege::All {
        conn.execute(
            "DELETE FROM access_grants WHERE role = ?1 AND object_name = ?2",
            params![role, object_name],
        )?
    } else {
        conn.execute(
            "DELETE FROM access_grants WHERE role = ?1 AND privilege = ?2 AND object_name = ?3",
            params![role, privilege.as_str(), object_name],
        )?
    };
    if removed > 0 {
        tracing::info!(role, privilege = privilege.as_str(), object = object_name, "revoked");
    }
    Ok(removed > 0)
}

/// Adds `actor` to `role`. Returns `false` if already a member.
///
/// # Errors
///
/// Returns `DbError::Database` on SQL failure.
pub fn assign_role(conn: &Connection, actor: &str, role: &str) -> Result<bool, DbError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO role_members (actor, role) VALUES (?1, ?2)",
        params![actor, role],
    )?;
    Ok(inserted > 0)
}

/// Removes `actor` from `role`. Returns `false` if not a member.
///
/// # Errors
///
/// Returns `DbError::Database` on SQL failure.
pub fn remove_role(conn: &Connection, actor: &str, role: &str) -> Result<bool, DbError> {
    let removed = conn.execute(
        "DELETE FROM role_members WHERE actor = ?1 AND role = ?2",
        params![actor, role],
    )?;
    Ok(removed > 0)
}

/// Returns true if `actor` holds `privilege` on `object_name` through any
/// role, its own name, or `PUBLIC`. A held `ALL` covers every privilege.
///
/// # Errors
///
/// Returns `DbError::Database` on SQL failure.
pub fn is_permitted(
    conn: &Connection,
    actor: &str,
    privilege: Privilege,
    object_name: &str,
) -> Result<bool, DbError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT g.privilege FROM access_grants g
         WHERE g.object_name = ?2
           AND (g.role = ?1
                OR g.role = ?3
                OR g.role IN (SELECT m.role FROM role_members m WHERE m.actor = ?1))",
    )?;
    let rows = stmt.query_map(params![actor, object_name, PUBLIC_ROLE], |row| {
        row.get::<_, String>(0)
    })?;

    for row in rows {
        if let Ok(held) = row?.parse::<Privilege>() {
            if held.implies(privilege) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Fails with [`DbError::PermissionDenied`] unless [`is_permitted`] holds.
///
/// # Errors
///
/// Returns `DbError::PermissionDenied` or `DbError::Database`.
pub fn require(
    conn: &Connection,
    actor: &str,
    privilege: Privilege,
    object_name: &str,
) -> Result<(), DbError> {
    if is_permitted(conn, actor, privilege, object_name)? {
        Ok(())
    } else {
        tracing::warn!(actor, privilege = privilege.as_str(), object = object_name, "permission denied");
        Err(DbError::PermissionDenied {
            actor: actor.to_string(),
            privilege,
            object: object_name.to_string(),
        })
    }
}

/// Lists the grants held directly by `role`, ordered by object then privilege.
///
/// # Errors
///
/// Returns `DbError::Database` on SQL failure.
pub fn grants_for(conn: &Connection, role: &str) -> Result<Vec<Grant>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT role, privilege, object_name FROM access_grants
         WHERE role = ?1 ORDER BY object_name, privilege",
    )?;
    let rows = stmt.query_map([role], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut grants = Vec::new();
    for row in rows {
        let (role, privilege, object_name) = row?;
        // The CHECK constraint on `privilege` keeps unknown labels out.
        if let Ok(privilege) = privilege.parse() {
            grants.push(Grant {
                role,
                privilege,
                object_name,
            });
        }
    }
    Ok(grants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::campus_tables;
    use crate::pool::open_in_memory;
    use crate::schema::{RerunPolicy, SchemaManager};

    fn test_db() -> Connection {
        let conn = open_in_memory().expect("should open");
        SchemaManager::new(campus_tables(), RerunPolicy::FailIfExists)
            .expect("valid schema")
            .create_all(&conn)
            .expect("schema should be created");
        conn
    }

    #[test]
    fn grant_through_role_membership() {
        let conn = test_db();
        assert!(!is_permitted(&conn, "alice", Privilege::Insert, "students").expect("query"));

        assert!(grant(&conn, "registrar", Privilege::Insert, "students").expect("grant"));
        assert!(!grant(&conn, "registrar", Privilege::Insert, "students").expect("regrant"));
        assert!(assign_role(&conn, "alice", "registrar").expect("assign"));

        assert!(is_permitted(&conn, "alice", Privilege::Insert, "students").expect("query"));
        assert!(!is_permitted(&conn, "alice", Privilege::Delete, "students").expect("query"));
        assert!(!is_permitted(&conn, "alice", Privilege::Insert, "courses").expect("query"));
    }

    #[test]
    fn all_covers_every_privilege() {
        let conn = test_db();
        grant(&conn, "bob", Privilege::All, "courses").expect("grant");
        for p in [
            Privilege::Select,
            Privilege::Insert,
            Privilege::Update,
            Privilege::Delete,
        ] {
            assert!(is_permitted(&conn, "bob", p, "courses").expect("query"));
        }
    }

    #[test]
    fn narrower_grant_does_not_cover_others() {
        let conn = test_db();
        grant(&conn, "bob", Privilege::Select, "courses").expect("grant");
        assert!(is_permitted(&conn, "bob", Privilege::Select, "courses").expect("query"));
        assert!(!is_permitted(&conn, "bob", Privilege::Insert, "courses").expect("query"));
        assert!(!is_permitted(&conn, "bob", Privilege::All, "courses").expect("query"));
        assert!(!is_permitted(&conn, "bob", Privilege::Select, "students").expect("query"));
    }

    #[test]
    fn public_grants_apply_to_everyone() {
        let conn = test_db();
        grant(&conn, PUBLIC_ROLE, Privilege::Select, "courses").expect("grant");
        assert!(is_permitted(&conn, "anyone", Privilege::Select, "courses").expect("query"));
        assert!(!is_permitted(&conn, "anyone", Privilege::Update, "courses").expect("query"));
    }

    #[test]
    fn revoke_removes_access() {
        let conn = test_db();
        grant(&conn, "hr", Privilege::Update, "employees").expect("grant");
        grant(&conn, "hr", Privilege::Select, "employees").expect("grant");
        assign_role(&conn, "henry", "hr").expect("assign");

        assert!(revoke(&conn, "hr", Privilege::Update, "employees").expect("revoke"));
        assert!(!is_permitted(&conn, "henry", Privilege::Update, "employees").expect("query"));
        assert!(is_permitted(&conn, "henry", Privilege::Select, "employees").expect("query"));

        assert!(revoke(&conn, "hr", Privilege::All, "employees").expect("revoke all"));
        assert!(grants_for(&conn, "hr").expect("list").is_empty());
        assert!(!revoke(&conn, "hr", Privilege::All, "employees").expect("nothing left"));
    }

    #[test]
    fn removing_membership_removes_access() {
        let conn = test_db();
        grant(&conn, "registrar", Privilege::Delete, "enrollments").expect("grant");
        assign_role(&conn, "alice", "registrar").expect("assign");
        assert!(remove_role(&conn, "alice", "registrar").expect("remove"));

        let err = require(&conn, "alice", Privilege::Delete, "enrollments")
            .expect_err("should be denied");
        match err {
            DbError::PermissionDenied {
                actor,
                privilege,
                object,
            } => {
                assert_eq!(actor, "alice");
                assert_eq!(privilege, Privilege::Delete);
                assert_eq!(object, "enrollments");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn grants_for_lists_direct_grants() {
        let conn = test_db();
        grant(&conn, "reader", Privilege::Select, "students").expect("grant");
        grant(&conn, "reader", Privilege::Select, "courses").expect("grant");

        let grants = grants_for(&conn, "reader").expect("list");
        assert_eq!(
            grants,
            vec![
                Grant::new("reader", Privilege::Select, "courses"),
                Grant::new("reader", Privilege::Select, "students"),
            ]
        );
    }
}
