use anyhow::Result;
use parley_types::models::Reaction;
use rusqlite::{Connection, Row};

use crate::OptionalExt;

const COLUMNS: &str = "id, workspace_id, message_id, member_id, value, creation_time";

fn map_row(row: &Row) -> rusqlite::Result<Reaction> {
    Ok(Reaction {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        message_id: row.get(2)?,
        member_id: row.get(3)?,
        value: row.get(4)?,
        creation_time: row.get(5)?,
    })
}

pub fn insert(conn: &Connection, reaction: &Reaction) -> Result<()> {
    conn.execute(
        "INSERT INTO reactions (id, workspace_id, message_id, member_id, value, creation_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            reaction.id,
            reaction.workspace_id,
            reaction.message_id,
            reaction.member_id,
            reaction.value,
            reaction.creation_time
        ],
    )?;
    Ok(())
}

/// A member's reaction with a given value on a message.
pub fn find(
    conn: &Connection,
    message_id: &str,
    member_id: &str,
    value: &str,
) -> Result<Option<Reaction>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM reactions WHERE message_id = ?1 AND member_id = ?2 AND value = ?3"
    );
    conn.query_row(&sql, [message_id, member_id, value], map_row)
        .optional()
}

/// All reactions on a message in the order they were left.
pub fn list_for_message(conn: &Connection, message_id: &str) -> Result<Vec<Reaction>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM reactions WHERE message_id = ?1 ORDER BY creation_time, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([message_id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM reactions WHERE id = ?1", [id])?;
    Ok(())
}
