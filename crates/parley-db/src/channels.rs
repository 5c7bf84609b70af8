use anyhow::Result;
use parley_types::models::Channel;
use rusqlite::{Connection, Row};

use crate::OptionalExt;

fn map_row(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        workspace_id: row.get(2)?,
        creation_time: row.get(3)?,
    })
}

pub fn insert(conn: &Connection, channel: &Channel) -> Result<()> {
    conn.execute(
        "INSERT INTO channels (id, name, workspace_id, creation_time) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![channel.id, channel.name, channel.workspace_id, channel.creation_time],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Channel>> {
    conn.query_row(
        "SELECT id, name, workspace_id, creation_time FROM channels WHERE id = ?1",
        [id],
        map_row,
    )
    .optional()
}

pub fn list_for_workspace(conn: &Connection, workspace_id: &str) -> Result<Vec<Channel>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, workspace_id, creation_time FROM channels
         WHERE workspace_id = ?1
         ORDER BY creation_time, rowid",
    )?;
    let rows = stmt
        .query_map([workspace_id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_name(conn: &Connection, id: &str, name: &str) -> Result<()> {
    conn.execute("UPDATE channels SET name = ?2 WHERE id = ?1", [id, name])?;
    Ok(())
}

/// Delete a channel with its messages and their reactions.
pub fn delete_cascade(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM reactions WHERE message_id IN (SELECT id FROM messages WHERE channel_id = ?1)",
        [id],
    )?;
    conn.execute("DELETE FROM messages WHERE channel_id = ?1", [id])?;
    conn.execute("DELETE FROM channels WHERE id = ?1", [id])?;
    Ok(())
}
