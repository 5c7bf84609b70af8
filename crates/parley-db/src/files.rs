use anyhow::Result;
use rusqlite::Connection;

use crate::OptionalExt;
use crate::models::FileRow;

pub fn insert_file(conn: &Connection, file: &FileRow) -> Result<()> {
    conn.execute(
        "INSERT INTO files (id, content_type, size, sha256, creation_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![file.id, file.content_type, file.size, file.sha256, file.creation_time],
    )?;
    Ok(())
}

pub fn get_file(conn: &Connection, id: &str) -> Result<Option<FileRow>> {
    conn.query_row(
        "SELECT id, content_type, size, sha256, creation_time FROM files WHERE id = ?1",
        [id],
        |row| {
            Ok(FileRow {
                id: row.get(0)?,
                content_type: row.get(1)?,
                size: row.get(2)?,
                sha256: row.get(3)?,
                creation_time: row.get(4)?,
            })
        },
    )
    .optional()
}

// -- Upload tickets --

pub fn insert_ticket(conn: &Connection, id: &str, user_id: &str, expires_at: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO upload_tickets (id, user_id, expires_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![id, user_id, expires_at],
    )?;
    Ok(())
}

/// Consume an upload ticket. Returns the issuing user when the ticket exists
/// and has not expired; the ticket is deleted either way. Callers that record
/// the upload in the same transaction keep the ticket if that fails.
pub fn take_ticket(conn: &Connection, id: &str, now: i64) -> Result<Option<String>> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT user_id, expires_at FROM upload_tickets WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    conn.execute("DELETE FROM upload_tickets WHERE id = ?1", [id])?;

    Ok(row.and_then(|(user_id, expires_at)| (expires_at > now).then_some(user_id)))
}

pub fn purge_expired_tickets(conn: &Connection, now: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM upload_tickets WHERE expires_at <= ?1", [now])?)
}
