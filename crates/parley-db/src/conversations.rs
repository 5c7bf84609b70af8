use anyhow::Result;
use parley_types::models::Conversation;
use rusqlite::{Connection, Row};

use crate::OptionalExt;

const COLUMNS: &str = "id, workspace_id, member_one_id, member_two_id, creation_time";

fn map_row(row: &Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        member_one_id: row.get(2)?,
        member_two_id: row.get(3)?,
        creation_time: row.get(4)?,
    })
}

pub fn insert(conn: &Connection, conversation: &Conversation) -> Result<()> {
    conn.execute(
        "INSERT INTO conversations (id, workspace_id, member_one_id, member_two_id, creation_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            conversation.id,
            conversation.workspace_id,
            conversation.member_one_id,
            conversation.member_two_id,
            conversation.creation_time
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Conversation>> {
    let sql = format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1");
    conn.query_row(&sql, [id], map_row).optional()
}

/// The conversation between two members, whichever of them opened it.
pub fn find_between(
    conn: &Connection,
    workspace_id: &str,
    member_a: &str,
    member_b: &str,
) -> Result<Option<Conversation>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM conversations
         WHERE workspace_id = ?1
           AND ((member_one_id = ?2 AND member_two_id = ?3)
             OR (member_one_id = ?3 AND member_two_id = ?2))
         ORDER BY creation_time, rowid
         LIMIT 1"
    );
    conn.query_row(&sql, [workspace_id, member_a, member_b], map_row)
        .optional()
}
