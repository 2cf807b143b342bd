use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    db::{fmt_ts, parse_ts},
    error::ApiError,
    models::{Role, User},
};

const USER_COLS: &str = "id, username, password_hash, full_name, role, created_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role_raw: String = row.get(4)?;
    let created_raw: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        full_name: row.get(3)?,
        role: Role::parse(&role_raw).unwrap_or_default(),
        created_at: parse_ts(&created_raw),
    })
}

pub fn create(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    full_name: Option<&str>,
    role: Role,
) -> Result<User, ApiError> {
    if find_by_username(conn, username)?.is_some() {
        return Err(ApiError::validation("Username already exists"));
    }

    let now = Utc::now();
    conn.execute(
        "INSERT INTO users (username, password_hash, full_name, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![username, password_hash, full_name, role.as_str(), fmt_ts(now)],
    )?;

    Ok(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        full_name: full_name.map(str::to_string),
        role,
        created_at: now,
    })
}

pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<User>, ApiError> {
    let sql = format!("SELECT {USER_COLS} FROM users WHERE username = ?1");
    Ok(conn
        .query_row(&sql, params![username], user_from_row)
        .optional()?)
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<User>, ApiError> {
    let sql = format!("SELECT {USER_COLS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], user_from_row).optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn create_and_find_round_trip() {
        let conn = test_conn();
        let created = create(&conn, "casey", "hash", Some("Casey Lee"), Role::Admin).unwrap();

        let by_name = find_by_username(&conn, "casey").unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.role, Role::Admin);
        assert_eq!(by_name.full_name.as_deref(), Some("Casey Lee"));

        assert!(find_by_id(&conn, created.id).unwrap().is_some());
        assert!(find_by_id(&conn, created.id + 1).unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let conn = test_conn();
        create(&conn, "casey", "hash", None, Role::CaseManager).unwrap();
        let err = create(&conn, "casey", "hash2", None, Role::CaseManager).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
