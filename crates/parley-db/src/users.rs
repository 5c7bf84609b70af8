use anyhow::Result;
use parley_types::models::User;
use rusqlite::{Connection, Row};

use crate::OptionalExt;
use crate::models::UserRow;

const COLUMNS: &str = "id, name, email, password, image, creation_time";

fn map_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        image: row.get(4)?,
        creation_time: row.get(5)?,
    })
}

pub fn insert(
    conn: &Connection,
    id: &str,
    name: &str,
    email: &str,
    password_hash: &str,
    creation_time: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, password, creation_time) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id, name, email, password_hash, creation_time],
    )?;
    Ok(())
}

/// Lookup is case-insensitive (the column collates NOCASE).
pub fn get_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {COLUMNS} FROM users WHERE email = ?1");
    conn.query_row(&sql, [email], map_row).optional()
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {COLUMNS} FROM users WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id], map_row)
        .optional()?
        .map(UserRow::into_user))
}

pub fn set_image(conn: &Connection, id: &str, image: Option<&str>) -> Result<()> {
    conn.execute("UPDATE users SET image = ?2 WHERE id = ?1", rusqlite::params![id, image])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn test_email_lookup_ignores_case() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert(conn, "u1", "Ada", "Ada@Example.com", "hash", 10)?;
            let row = get_by_email(conn, "ada@example.com")?.expect("user");
            assert_eq!(row.id, "u1");
            assert_eq!(row.password, "hash");
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert(conn, "u1", "Ada", "ada@example.com", "hash", 10)?;
            assert!(insert(conn, "u2", "Other", "ADA@example.com", "hash", 11).is_err());
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
    }
}
