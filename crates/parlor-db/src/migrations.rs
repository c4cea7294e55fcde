use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            avatar      TEXT NOT NULL DEFAULT '/media/avatars/default.png',
            created_at  TEXT NOT NULL
        );

        -- user_lo < user_hi canonicalizes the unordered participant pair so
        -- the partial unique index below can enforce one live chat per pair.
        CREATE TABLE IF NOT EXISTS chats (
            id                TEXT PRIMARY KEY,
            user_lo           TEXT NOT NULL REFERENCES users(id),
            user_hi           TEXT NOT NULL REFERENCES users(id),
            last_activity_at  TEXT NOT NULL,
            deleted_at        TEXT,
            created_at        TEXT NOT NULL,
            CHECK (user_lo < user_hi)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_active_pair
            ON chats(user_lo, user_hi) WHERE deleted_at IS NULL;

        CREATE INDEX IF NOT EXISTS idx_chats_user_lo ON chats(user_lo);
        CREATE INDEX IF NOT EXISTS idx_chats_user_hi ON chats(user_hi);

        CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,
            chat_id          TEXT NOT NULL REFERENCES chats(id),
            sender_id        TEXT NOT NULL REFERENCES users(id),
            body             TEXT,
            attachment_kind  TEXT,
            attachment_id    TEXT,
            read_at          TEXT,
            deleted_at       TEXT,
            created_at       TEXT NOT NULL,
            CHECK (body IS NOT NULL OR attachment_id IS NOT NULL),
            CHECK ((attachment_kind IS NULL) = (attachment_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);

        CREATE TABLE IF NOT EXISTS file_attachments (
            id            TEXT PRIMARY KEY,
            location      TEXT NOT NULL,
            size_bytes    INTEGER NOT NULL,
            content_type  TEXT NOT NULL,
            display_name  TEXT NOT NULL,
            extension     TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audio_attachments (
            id            TEXT PRIMARY KEY,
            location      TEXT NOT NULL,
            size_bytes    INTEGER NOT NULL,
            content_type  TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
