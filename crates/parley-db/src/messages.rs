use anyhow::Result;
use parley_types::models::Message;
use rusqlite::{Connection, Row};

use crate::OptionalExt;

const COLUMNS: &str = "id, body, image, member_id, workspace_id, channel_id, conversation_id, \
                       parent_message_id, creation_time, updated_at";

fn map_row(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        body: row.get(1)?,
        image: row.get(2)?,
        member_id: row.get(3)?,
        workspace_id: row.get(4)?,
        channel_id: row.get(5)?,
        conversation_id: row.get(6)?,
        parent_message_id: row.get(7)?,
        creation_time: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Which stream a listing reads. Every field is matched exactly, so `None`
/// selects rows where that column is NULL: a channel listing only returns
/// top-level messages, a thread listing only that thread's replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFilter<'a> {
    pub channel_id: Option<&'a str>,
    pub conversation_id: Option<&'a str>,
    pub parent_message_id: Option<&'a str>,
}

/// Position in the newest-first ordering `(creation_time DESC, id DESC)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKey {
    pub creation_time: i64,
    pub id: String,
}

impl PageKey {
    pub fn of(message: &Message) -> Self {
        Self {
            creation_time: message.creation_time,
            id: message.id.clone(),
        }
    }
}

pub fn insert(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, body, image, member_id, workspace_id, channel_id,
                               conversation_id, parent_message_id, creation_time, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            message.id,
            message.body,
            message.image,
            message.member_id,
            message.workspace_id,
            message.channel_id,
            message.conversation_id,
            message.parent_message_id,
            message.creation_time,
            message.updated_at
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Message>> {
    let sql = format!("SELECT {COLUMNS} FROM messages WHERE id = ?1");
    conn.query_row(&sql, [id], map_row).optional()
}

/// Up to `limit` messages matching `filter`, newest first, strictly after
/// `after` when given.
pub fn list_page(
    conn: &Connection,
    filter: MessageFilter<'_>,
    after: Option<&PageKey>,
    limit: u32,
) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM messages
         WHERE channel_id IS ?1 AND parent_message_id IS ?2 AND conversation_id IS ?3
           AND (?4 IS NULL OR creation_time < ?4 OR (creation_time = ?4 AND id < ?5))
         ORDER BY creation_time DESC, id DESC
         LIMIT ?6"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params![
                filter.channel_id,
                filter.parent_message_id,
                filter.conversation_id,
                after.map(|k| k.creation_time),
                after.map(|k| k.id.as_str()),
                limit
            ],
            map_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every reply to `parent_id`, oldest first.
pub fn list_replies(conn: &Connection, parent_id: &str) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM messages WHERE parent_message_id = ?1 ORDER BY creation_time, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([parent_id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_body(conn: &Connection, id: &str, body: &str, updated_at: i64) -> Result<()> {
    conn.execute(
        "UPDATE messages SET body = ?2, updated_at = ?3 WHERE id = ?1",
        rusqlite::params![id, body, updated_at],
    )?;
    Ok(())
}

/// Delete a message and the reactions on it. Replies are left in place.
pub fn delete_cascade(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM reactions WHERE message_id = ?1", [id])?;
    conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
    Ok(())
}
