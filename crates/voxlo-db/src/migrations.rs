use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS identities (
            id              TEXT PRIMARY KEY,
            display_name    TEXT NOT NULL,
            invite_code     TEXT NOT NULL UNIQUE,
            created_at      TEXT NOT NULL,
            deactivated     INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS conversations (
            room_id         TEXT PRIMARY KEY,
            participant_a   TEXT NOT NULL,
            participant_b   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            room_id             TEXT NOT NULL REFERENCES conversations(room_id) ON DELETE CASCADE,
            sender_id           TEXT NOT NULL,
            text                TEXT NOT NULL,
            sent_at             INTEGER NOT NULL,
            client_timestamp    INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, sent_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
