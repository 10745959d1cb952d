use crate::models::{ConversationListRow, ConversationRow};
use crate::{Database, now_ts};
use anyhow::{Result, anyhow};
use parley_types::models::PREVIEW_MAX_CHARS;
use rusqlite::Connection;

use super::OptionalExt;

/// Order a participant pair canonically so the unordered pair maps to
/// exactly one (participant_a, participant_b) tuple. The storage-layer
/// UNIQUE constraint rides on this ordering.
pub fn canonical_pair<'a>(user_a: &'a str, user_b: &'a str) -> (&'a str, &'a str) {
    if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

impl Database {
    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation_by_id(conn, id))
    }

    pub fn find_conversation_by_pair(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<ConversationRow>> {
        let (a, b) = canonical_pair(user_a, user_b);
        self.with_conn(|conn| query_conversation_by_pair(conn, a, b))
    }

    /// Race-safe idempotent creation: the insert yields to the uniqueness
    /// constraint on the canonical pair, then the winner (whoever it was) is
    /// re-read. Returns the row and whether this call created it.
    pub fn get_or_create_conversation(
        &self,
        candidate_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<(ConversationRow, bool)> {
        let (a, b) = canonical_pair(user_a, user_b);
        self.with_conn(|conn| {
            let now = now_ts();
            let inserted = conn.execute(
                "INSERT INTO conversations (id, participant_a, participant_b, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(participant_a, participant_b) DO NOTHING",
                rusqlite::params![candidate_id, a, b, now],
            )?;

            let row = query_conversation_by_pair(conn, a, b)?
                .ok_or_else(|| anyhow!("conversation missing after upsert for pair ({a}, {b})"))?;

            Ok((row, inserted == 1))
        })
    }

    /// Conversations where `user_id` participates, excluding any whose other
    /// participant is blocked in either direction. Each row carries the
    /// per-conversation unread count for `user_id`.
    pub fn list_conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id,
                        CASE WHEN c.participant_a = ?1 THEN c.participant_b
                             ELSE c.participant_a END,
                        u.username,
                        c.last_message_text,
                        c.last_message_at,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.conversation_id = c.id
                            AND m.recipient_id = ?1
                            AND m.read_at IS NULL),
                        c.created_at
                 FROM conversations c
                 JOIN users u ON u.id = CASE WHEN c.participant_a = ?1 THEN c.participant_b
                                             ELSE c.participant_a END
                 WHERE (c.participant_a = ?1 OR c.participant_b = ?1)
                   AND NOT EXISTS (
                       SELECT 1 FROM blocks b
                        WHERE (b.blocker_id = c.participant_a AND b.blocked_id = c.participant_b)
                           OR (b.blocker_id = c.participant_b AND b.blocked_id = c.participant_a))
                 ORDER BY COALESCE(c.last_message_at, c.created_at) DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationListRow {
                        id: row.get(0)?,
                        other_user_id: row.get(1)?,
                        other_username: row.get(2)?,
                        last_message_text: row.get(3)?,
                        last_message_at: row.get(4)?,
                        unread_count: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Recompute the denormalized preview from the most recent non-deleted
    /// message, clearing both fields when none remain. Pure with respect to
    /// current message contents, so repeated or concurrent invocations
    /// converge on the same state.
    pub fn refresh_conversation_preview(&self, conversation_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let latest: Option<(String, String)> = conn
                .query_row(
                    "SELECT body, created_at FROM messages
                      WHERE conversation_id = ?1 AND is_deleted = 0
                      ORDER BY created_at DESC, id DESC
                      LIMIT 1",
                    [conversation_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let (text, at) = match latest {
                Some((body, created_at)) => {
                    (Some(truncate_chars(&body, PREVIEW_MAX_CHARS)), Some(created_at))
                }
                None => (None, None),
            };

            conn.execute(
                "UPDATE conversations
                    SET last_message_text = ?1, last_message_at = ?2, updated_at = ?3
                  WHERE id = ?4",
                rusqlite::params![text, at, now_ts(), conversation_id],
            )?;

            Ok(())
        })
    }

    /// Mark every unread message addressed to `user_id` in the conversation
    /// read, and the matching message notifications with it. Both updates
    /// run in one transaction so the unread badge never shows a half-applied
    /// state. Returns (messages marked, notifications marked).
    pub fn mark_conversation_read(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<(usize, usize)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_ts();

            let messages = tx.execute(
                "UPDATE messages SET read_at = ?1
                  WHERE conversation_id = ?2 AND recipient_id = ?3 AND read_at IS NULL",
                rusqlite::params![now, conversation_id, user_id],
            )?;

            let notifications = tx.execute(
                "UPDATE notifications SET read_at = ?1
                  WHERE user_id = ?2
                    AND kind = 'message'
                    AND read_at IS NULL
                    AND json_extract(payload, '$.conversation_id') = ?3",
                rusqlite::params![now, user_id, conversation_id],
            )?;

            tx.commit()?;
            Ok((messages, notifications))
        })
    }

    pub fn conversation_unread_count(&self, conversation_id: &str, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                  WHERE conversation_id = ?1 AND recipient_id = ?2 AND read_at IS NULL",
                [conversation_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Unread messages across all conversations, excluding counterparts
    /// blocked in either direction.
    pub fn total_unread_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*)
                 FROM messages m
                 WHERE m.recipient_id = ?1
                   AND m.read_at IS NULL
                   AND NOT EXISTS (
                       SELECT 1 FROM blocks b
                        WHERE (b.blocker_id = m.sender_id AND b.blocked_id = m.recipient_id)
                           OR (b.blocker_id = m.recipient_id AND b.blocked_id = m.sender_id))",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn query_conversation_by_id(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, participant_a, participant_b, last_message_text, last_message_at,
                created_at, updated_at
         FROM conversations WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                participant_a: row.get(1)?,
                participant_b: row.get(2)?,
                last_message_text: row.get(3)?,
                last_message_at: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation_by_pair(
    conn: &Connection,
    participant_a: &str,
    participant_b: &str,
) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, participant_a, participant_b, last_message_text, last_message_at,
                created_at, updated_at
         FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
    )?;

    let row = stmt
        .query_row([participant_a, participant_b], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                participant_a: row.get(1)?,
                participant_b: row.get(2)?,
                last_message_text: row.get(3)?,
                last_message_at: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}
