use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (groups, channels, messages)");
        conn.execute_batch(
            "
            CREATE TABLE groups (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE channels (
                id          TEXT PRIMARY KEY,
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                UNIQUE(group_id, name)
            );

            CREATE TABLE group_members (
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                joined_at   TEXT NOT NULL,
                PRIMARY KEY (group_id, user_id)
            );

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                channel_id  TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                author_id   TEXT NOT NULL,
                body        TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                deleted_at  TEXT
            );

            CREATE INDEX idx_messages_channel
                ON messages(channel_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (read_positions)");
        conn.execute_batch(
            "
            CREATE TABLE read_positions (
                user_id       TEXT NOT NULL,
                channel_id    TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                last_read_at  TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                PRIMARY KEY (user_id, channel_id)
            );

            CREATE INDEX idx_read_positions_channel
                ON read_positions(channel_id);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
