use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::info;

use crate::{
    db::fmt_ts,
    error::ApiError,
    models::Resource,
    resources,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub already_saved: bool,
}

/// Bookmark a resource for a user. Saving twice is a success, not an error;
/// the composite primary key keeps the relationship single-rowed.
pub fn save(conn: &Connection, user_id: i64, resource_id: i64) -> Result<SaveOutcome, ApiError> {
    // Existence check first so a bookmark of a missing resource 404s.
    resources::get_by_id(conn, resource_id)?;

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO saved_resources (user_id, resource_id, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, resource_id, fmt_ts(Utc::now())],
    )?;

    if inserted == 1 {
        info!(user_id, resource_id, "Resource saved");
    }

    Ok(SaveOutcome {
        already_saved: inserted == 0,
    })
}

/// Remove a bookmark; returns the resource for confirmation display.
pub fn unsave(conn: &Connection, user_id: i64, resource_id: i64) -> Result<Resource, ApiError> {
    let deleted = conn.execute(
        "DELETE FROM saved_resources WHERE user_id = ?1 AND resource_id = ?2",
        params![user_id, resource_id],
    )?;
    if deleted == 0 {
        return Err(ApiError::not_found("Resource not saved"));
    }

    info!(user_id, resource_id, "Resource unsaved");
    resources::get_by_id(conn, resource_id)
}

/// The user's bookmarks, most recently saved first.
pub fn list_saved(conn: &Connection, user_id: i64) -> Result<Vec<Resource>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.name, r.category, r.status, r.contact_details, r.notes, r.zipcode, \
                r.created_at, r.last_updated, r.version \
         FROM saved_resources s JOIN resources r ON r.id = s.resource_id \
         WHERE s.user_id = ?1 ORDER BY s.created_at DESC",
    )?;
    let rows = stmt.query_map(params![user_id], resources::resource_from_row)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use crate::models::CreateResourceRequest;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    fn seed_user(conn: &Connection, username: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (username, password_hash, role, created_at) VALUES (?1, 'x', 'CASE_MANAGER', ?2)",
            params![username, fmt_ts(Utc::now())],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn seed_resource(conn: &Connection, name: &str) -> i64 {
        resources::create(
            conn,
            &CreateResourceRequest {
                name: name.to_string(),
                category: "food".to_string(),
                zipcode: "94103".to_string(),
                status: None,
                contact_details: None,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn save_is_idempotent() {
        let conn = test_conn();
        let user = seed_user(&conn, "casey");
        let resource = seed_resource(&conn, "Food Bank");

        let first = save(&conn, user, resource).unwrap();
        assert!(!first.already_saved);
        let second = save(&conn, user, resource).unwrap();
        assert!(second.already_saved);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM saved_resources", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn save_missing_resource_is_not_found() {
        let conn = test_conn();
        let user = seed_user(&conn, "casey");
        let err = save(&conn, user, 999).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn unsave_requires_existing_relationship() {
        let conn = test_conn();
        let user = seed_user(&conn, "casey");
        let resource = seed_resource(&conn, "Food Bank");

        let err = unsave(&conn, user, resource).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        save(&conn, user, resource).unwrap();
        let returned = unsave(&conn, user, resource).unwrap();
        assert_eq!(returned.id, resource);
        assert!(list_saved(&conn, user).unwrap().is_empty());
    }

    #[test]
    fn list_saved_orders_by_save_time_descending() {
        let conn = test_conn();
        let user = seed_user(&conn, "casey");
        let first = seed_resource(&conn, "First");
        let second = seed_resource(&conn, "Second");

        save(&conn, user, first).unwrap();
        save(&conn, user, second).unwrap();
        // Force distinct save times.
        conn.execute(
            "UPDATE saved_resources SET created_at = '2024-01-01T00:00:00.000000Z' WHERE resource_id = ?1",
            params![first],
        )
        .unwrap();
        conn.execute(
            "UPDATE saved_resources SET created_at = '2024-01-02T00:00:00.000000Z' WHERE resource_id = ?1",
            params![second],
        )
        .unwrap();

        let saved = list_saved(&conn, user).unwrap();
        let names: Vec<_> = saved.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Second", "First"]);
    }
}
