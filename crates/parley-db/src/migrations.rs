use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password        TEXT NOT NULL,
            image           TEXT,
            creation_time   INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workspaces (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            user_id         TEXT NOT NULL REFERENCES users(id),
            join_code       TEXT NOT NULL,
            creation_time   INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS members (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id),
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            role            TEXT NOT NULL CHECK (role IN ('admin', 'member')),
            creation_time   INTEGER NOT NULL,
            UNIQUE(workspace_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_user
            ON members(user_id);

        CREATE TABLE IF NOT EXISTS channels (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            creation_time   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channels_workspace
            ON channels(workspace_id);

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            member_one_id   TEXT NOT NULL REFERENCES members(id),
            member_two_id   TEXT NOT NULL REFERENCES members(id),
            creation_time   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_workspace
            ON conversations(workspace_id);

        -- parent_message_id carries no foreign key: replies outlive a deleted root.
        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            body                TEXT NOT NULL,
            image               TEXT,
            member_id           TEXT NOT NULL REFERENCES members(id),
            workspace_id        TEXT NOT NULL REFERENCES workspaces(id),
            channel_id          TEXT REFERENCES channels(id),
            conversation_id     TEXT REFERENCES conversations(id),
            parent_message_id   TEXT,
            creation_time       INTEGER NOT NULL,
            updated_at          INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_messages_listing
            ON messages(channel_id, parent_message_id, conversation_id, creation_time);

        CREATE INDEX IF NOT EXISTS idx_messages_member
            ON messages(member_id);

        CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent_message_id);

        CREATE TABLE IF NOT EXISTS reactions (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id),
            message_id      TEXT NOT NULL REFERENCES messages(id),
            member_id       TEXT NOT NULL REFERENCES members(id),
            value           TEXT NOT NULL,
            creation_time   INTEGER NOT NULL,
            UNIQUE(message_id, member_id, value)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE INDEX IF NOT EXISTS idx_reactions_member
            ON reactions(member_id);

        CREATE TABLE IF NOT EXISTS files (
            id              TEXT PRIMARY KEY,
            content_type    TEXT NOT NULL,
            size            INTEGER NOT NULL,
            sha256          TEXT NOT NULL,
            creation_time   INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS upload_tickets (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id),
            expires_at      INTEGER NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
