use crate::models::NotificationRow;
use crate::{Database, now_ts};
use anyhow::Result;
use rusqlite::Row;

use super::OptionalExt;

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        link: row.get(5)?,
        payload: row.get(6)?,
        read_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, body, link, payload, read_at, created_at";

impl Database {
    /// Pure append; delivery is nothing more than this row existing.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_notification(
        &self,
        id: &str,
        user_id: &str,
        kind: &str,
        title: &str,
        body: &str,
        link: Option<&str>,
        payload: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, title, body, link, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![id, user_id, kind, title, body, link, payload, created_at],
            )?;
            Ok(())
        })
    }

    pub fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = if unread_only {
                format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                     WHERE user_id = ?1 AND read_at IS NULL
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2"
                )
            } else {
                format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                     WHERE user_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2"
                )
            };

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read_at IS NULL",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// None: no such notification for this user. Some(false): it was already
    /// read (success no-op). Some(true): newly marked.
    pub fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let unread: Option<bool> = conn
                .query_row(
                    "SELECT read_at IS NULL FROM notifications WHERE id = ?1 AND user_id = ?2",
                    [id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            match unread {
                None => Ok(None),
                Some(false) => Ok(Some(false)),
                Some(true) => {
                    conn.execute(
                        "UPDATE notifications SET read_at = ?1 WHERE id = ?2",
                        rusqlite::params![now_ts(), id],
                    )?;
                    Ok(Some(true))
                }
            }
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read_at = ?1 WHERE user_id = ?2 AND read_at IS NULL",
                rusqlite::params![now_ts(), user_id],
            )?;
            Ok(changed)
        })
    }

    /// Moderation cascade: redact in place every notification whose payload
    /// references the taken-down message. Rows are never deleted, so the
    /// inbox still shows that moderation occurred.
    pub fn rewrite_notifications_for_message(
        &self,
        message_id: &str,
        title: &str,
        body: &str,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET title = ?1, body = ?2
                  WHERE json_extract(payload, '$.message_id') = ?3",
                rusqlite::params![title, body, message_id],
            )?;
            Ok(changed)
        })
    }

    /// One retention batch: unconditional age-based delete.
    pub fn purge_notifications_batch(&self, cutoff: &str, limit: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM notifications WHERE id IN (
                    SELECT id FROM notifications WHERE created_at < ?1 LIMIT ?2)",
                rusqlite::params![cutoff, limit],
            )?;
            Ok(deleted)
        })
    }
}
