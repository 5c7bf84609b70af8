use anyhow::Result;
use parley_types::models::Workspace;
use rusqlite::{Connection, Row};
use tracing::debug;

use crate::OptionalExt;

fn map_row(row: &Row) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        join_code: row.get(3)?,
        creation_time: row.get(4)?,
    })
}

pub fn insert(conn: &Connection, ws: &Workspace) -> Result<()> {
    conn.execute(
        "INSERT INTO workspaces (id, name, user_id, join_code, creation_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![ws.id, ws.name, ws.user_id, ws.join_code, ws.creation_time],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Workspace>> {
    conn.query_row(
        "SELECT id, name, user_id, join_code, creation_time FROM workspaces WHERE id = ?1",
        [id],
        map_row,
    )
    .optional()
}

/// Workspaces the user belongs to, in the order they joined.
pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Workspace>> {
    let mut stmt = conn.prepare(
        "SELECT w.id, w.name, w.user_id, w.join_code, w.creation_time
         FROM members m
         JOIN workspaces w ON w.id = m.workspace_id
         WHERE m.user_id = ?1
         ORDER BY m.creation_time, m.rowid",
    )?;

    let rows = stmt
        .query_map([user_id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn update_name(conn: &Connection, id: &str, name: &str) -> Result<()> {
    conn.execute("UPDATE workspaces SET name = ?2 WHERE id = ?1", [id, name])?;
    Ok(())
}

pub fn update_join_code(conn: &Connection, id: &str, join_code: &str) -> Result<()> {
    conn.execute("UPDATE workspaces SET join_code = ?2 WHERE id = ?1", [id, join_code])?;
    Ok(())
}

/// Delete a workspace and every document scoped to it.
/// Callers run this inside a transaction.
pub fn delete_cascade(conn: &Connection, id: &str) -> Result<()> {
    let reactions = conn.execute("DELETE FROM reactions WHERE workspace_id = ?1", [id])?;
    let messages = conn.execute("DELETE FROM messages WHERE workspace_id = ?1", [id])?;
    conn.execute("DELETE FROM conversations WHERE workspace_id = ?1", [id])?;
    conn.execute("DELETE FROM channels WHERE workspace_id = ?1", [id])?;
    let members = conn.execute("DELETE FROM members WHERE workspace_id = ?1", [id])?;
    conn.execute("DELETE FROM workspaces WHERE id = ?1", [id])?;

    debug!(
        "Removed workspace {} ({} members, {} messages, {} reactions)",
        id, members, messages, reactions
    );
    Ok(())
}
