use anyhow::Result;
use parley_types::models::{Member, Role};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use tracing::debug;

use crate::OptionalExt;

const COLUMNS: &str = "id, user_id, workspace_id, role, creation_time";

fn map_row(row: &Row) -> rusqlite::Result<Member> {
    let role: String = row.get(3)?;
    Ok(Member {
        id: row.get(0)?,
        user_id: row.get(1)?,
        workspace_id: row.get(2)?,
        role: role
            .parse()
            .map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
            })?,
        creation_time: row.get(4)?,
    })
}

pub fn insert(conn: &Connection, member: &Member) -> Result<()> {
    conn.execute(
        "INSERT INTO members (id, user_id, workspace_id, role, creation_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            member.id,
            member.user_id,
            member.workspace_id,
            member.role.as_str(),
            member.creation_time
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Member>> {
    let sql = format!("SELECT {COLUMNS} FROM members WHERE id = ?1");
    conn.query_row(&sql, [id], map_row).optional()
}

/// The membership of `user_id` in `workspace_id`, if any.
pub fn get_for_user(
    conn: &Connection,
    workspace_id: &str,
    user_id: &str,
) -> Result<Option<Member>> {
    let sql = format!("SELECT {COLUMNS} FROM members WHERE workspace_id = ?1 AND user_id = ?2");
    conn.query_row(&sql, [workspace_id, user_id], map_row).optional()
}

pub fn list_for_workspace(conn: &Connection, workspace_id: &str) -> Result<Vec<Member>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM members WHERE workspace_id = ?1 ORDER BY creation_time, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([workspace_id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_role(conn: &Connection, id: &str, role: Role) -> Result<()> {
    conn.execute("UPDATE members SET role = ?2 WHERE id = ?1", [id, role.as_str()])?;
    Ok(())
}

/// Delete a member together with everything that hangs off it: its messages
/// (and every reaction on them), its own reactions elsewhere, and its direct
/// conversations (with their messages and reactions).
/// Callers run this inside a transaction.
pub fn delete_cascade(conn: &Connection, id: &str) -> Result<()> {
    const CONVERSATIONS: &str =
        "SELECT id FROM conversations WHERE member_one_id = ?1 OR member_two_id = ?1";

    // Reactions on messages that are about to disappear, whoever left them.
    conn.execute(
        &format!(
            "DELETE FROM reactions WHERE message_id IN (
                SELECT id FROM messages
                WHERE member_id = ?1 OR conversation_id IN ({CONVERSATIONS})
            )"
        ),
        [id],
    )?;
    let messages = conn.execute(
        &format!(
            "DELETE FROM messages WHERE member_id = ?1 OR conversation_id IN ({CONVERSATIONS})"
        ),
        [id],
    )?;
    let reactions = conn.execute("DELETE FROM reactions WHERE member_id = ?1", [id])?;
    let conversations = conn.execute(
        "DELETE FROM conversations WHERE member_one_id = ?1 OR member_two_id = ?1",
        [id],
    )?;
    conn.execute("DELETE FROM members WHERE id = ?1", [id])?;

    debug!(
        "Removed member {} ({} messages, {} reactions, {} conversations)",
        id, messages, reactions, conversations
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_member, seed_workspace};
    use crate::{Database, conversations, messages, reactions};
    use parley_types::models::{Conversation, Message, Reaction};

    fn message(id: &str, member_id: &str, ws: &str, conversation_id: Option<&str>) -> Message {
        Message {
            id: id.into(),
            body: "hi".into(),
            image: None,
            member_id: member_id.into(),
            workspace_id: ws.into(),
            channel_id: None,
            conversation_id: conversation_id.map(String::from),
            parent_message_id: None,
            creation_time: 5,
            updated_at: None,
        }
    }

    fn reaction(id: &str, message_id: &str, member_id: &str, ws: &str) -> Reaction {
        Reaction {
            id: id.into(),
            workspace_id: ws.into(),
            message_id: message_id.into(),
            member_id: member_id.into(),
            value: "👍".into(),
            creation_time: 6,
        }
    }

    #[test]
    fn test_role_roundtrips_through_column() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let (_, ws, admin) = seed_workspace(conn, "a");
            let (user_b, member_b) = seed_member(conn, &ws, "b");

            assert_eq!(get(conn, &admin)?.unwrap().role, Role::Admin);
            assert_eq!(get_for_user(conn, &ws, &user_b)?.unwrap().id, member_b);

            update_role(conn, &member_b, Role::Admin)?;
            assert!(get(conn, &member_b)?.unwrap().is_admin());
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete_cascade_removes_messages_reactions_and_conversations() {
        let db = Database::open_in_memory().unwrap();
        db.with_tx(|tx| {
            let (_, ws, admin) = seed_workspace(tx, "a");
            let (_, leaver) = seed_member(tx, &ws, "b");

            conversations::insert(
                tx,
                &Conversation {
                    id: "dm".into(),
                    workspace_id: ws.clone(),
                    member_one_id: admin.clone(),
                    member_two_id: leaver.clone(),
                    creation_time: 3,
                },
            )?;

            // leaver's own message, with the admin's reaction on it
            messages::insert(tx, &message("m1", &leaver, &ws, None))?;
            reactions::insert(tx, &reaction("r1", "m1", &admin, &ws))?;
            // admin's message in the DM with leaver
            messages::insert(tx, &message("m2", &admin, &ws, Some("dm")))?;
            // admin's unrelated message, with leaver's reaction
            messages::insert(tx, &message("m3", &admin, &ws, None))?;
            reactions::insert(tx, &reaction("r3", "m3", &leaver, &ws))?;

            delete_cascade(tx, &leaver)?;

            assert!(get(tx, &leaver)?.is_none());
            assert!(messages::get(tx, "m1")?.is_none());
            assert!(messages::get(tx, "m2")?.is_none());
            assert!(messages::get(tx, "m3")?.is_some());
            assert!(reactions::list_for_message(tx, "m3")?.is_empty());
            assert!(conversations::get(tx, "dm")?.is_none());
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
    }
}
