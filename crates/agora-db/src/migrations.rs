use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (channels, messages, reactions)");
        conn.execute_batch(
            "
            CREATE TABLE channels (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                is_admin_only   INTEGER NOT NULL DEFAULT 0,
                position        INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE messages (
                id                  TEXT PRIMARY KEY,
                channel_id          TEXT NOT NULL REFERENCES channels(id),
                user_id             TEXT NOT NULL,
                author_name         TEXT NOT NULL,
                content             TEXT NOT NULL,
                attachment_url      TEXT,
                attachment_type     TEXT,
                parent_id           TEXT REFERENCES messages(id),
                is_admin_authored   INTEGER NOT NULL,
                nonce               TEXT,
                created_at          TEXT NOT NULL
            );

            CREATE INDEX idx_messages_channel
                ON messages(channel_id, created_at, id);

            CREATE TABLE reactions (
                message_id  TEXT NOT NULL REFERENCES messages(id),
                emoji       TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (message_id, emoji, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
