use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            role        TEXT NOT NULL DEFAULT 'user'
                        CHECK (role IN ('user', 'moderator')),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Participants are stored in canonical (sorted) order so the
        -- unordered-pair invariant is a plain two-column UNIQUE constraint.
        CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT PRIMARY KEY,
            participant_a       TEXT NOT NULL REFERENCES users(id),
            participant_b       TEXT NOT NULL REFERENCES users(id),
            last_message_text   TEXT,
            last_message_at     TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at          TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (participant_a, participant_b),
            CHECK (participant_a < participant_b)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            recipient_id    TEXT NOT NULL REFERENCES users(id),
            body            TEXT NOT NULL,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            deleted_at      TEXT,
            deleted_by      TEXT,
            read_at         TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK (sender_id <> recipient_id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(recipient_id, read_at);

        CREATE TABLE IF NOT EXISTS blocks (
            blocker_id  TEXT NOT NULL REFERENCES users(id),
            blocked_id  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (blocker_id, blocked_id),
            CHECK (blocker_id <> blocked_id)
        );

        CREATE INDEX IF NOT EXISTS idx_blocks_blocked
            ON blocks(blocked_id);

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL,
            title       TEXT NOT NULL,
            body        TEXT NOT NULL,
            link        TEXT,
            payload     TEXT NOT NULL,
            read_at     TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);

        CREATE TABLE IF NOT EXISTS reports (
            id              TEXT PRIMARY KEY,
            reporter_id     TEXT NOT NULL REFERENCES users(id),
            target_user_id  TEXT NOT NULL REFERENCES users(id),
            message_id      TEXT,
            conversation_id TEXT,
            reason          TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'open'
                            CHECK (status IN ('open', 'resolved')),
            resolved_at     TEXT,
            resolved_by     TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_reports_status
            ON reports(status, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
