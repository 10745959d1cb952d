use crate::models::MessageRow;
use crate::{Database, now_ts};
use anyhow::Result;
use parley_types::models::MODERATION_PLACEHOLDER;
use rusqlite::{Connection, Row};

use super::OptionalExt;

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        recipient_id: row.get(3)?,
        body: row.get(4)?,
        is_deleted: row.get(5)?,
        deleted_at: row.get(6)?,
        deleted_by: row.get(7)?,
        read_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, recipient_id, body, \
     is_deleted, deleted_at, deleted_by, read_at, created_at";

impl Database {
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, recipient_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, conversation_id, sender_id, recipient_id, body, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message_by_id(conn, id))
    }

    /// Oldest first. Clients render a scrollback top-down, so this ordering
    /// is load-bearing.
    pub fn list_messages(&self, conversation_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2"
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![conversation_id, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Moderation takedown: the body becomes the fixed placeholder and is
    /// immutable afterwards. Returns false when the message was already
    /// deleted (re-removal is a no-op).
    pub fn soft_delete_message(&self, id: &str, moderator_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages
                    SET body = ?2, is_deleted = 1, deleted_at = ?3, deleted_by = ?4
                  WHERE id = ?1 AND is_deleted = 0",
                rusqlite::params![id, MODERATION_PLACEHOLDER, now_ts(), moderator_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// One retention batch: hard-delete up to `limit` messages created before
    /// `cutoff`. Returns the number deleted and the distinct conversations
    /// touched, so the caller can recompute previews once per conversation.
    pub fn purge_messages_batch(&self, cutoff: &str, limit: i64) -> Result<(usize, Vec<String>)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id FROM messages
                 WHERE created_at < ?1
                 ORDER BY created_at ASC
                 LIMIT ?2",
            )?;
            let doomed = stmt
                .query_map(rusqlite::params![cutoff, limit], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if doomed.is_empty() {
                return Ok((0, Vec::new()));
            }

            let placeholders: Vec<String> =
                (1..=doomed.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "DELETE FROM messages WHERE id IN ({})",
                placeholders.join(", ")
            );
            let params: Vec<&dyn rusqlite::types::ToSql> = doomed
                .iter()
                .map(|(id, _)| id as &dyn rusqlite::types::ToSql)
                .collect();
            let deleted = conn.execute(&sql, params.as_slice())?;

            let mut conversations: Vec<String> =
                doomed.into_iter().map(|(_, cid)| cid).collect();
            conversations.sort();
            conversations.dedup();

            Ok((deleted, conversations))
        })
    }
}

fn query_message_by_id(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))?;

    let row = stmt.query_row([id], message_from_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testutil::{seed_moderator, seed_user, test_db};
    use uuid::Uuid;

    fn seed_conversation(db: &Database) -> (String, String, String) {
        let alice = seed_user(db, "alice");
        let bob = seed_user(db, "bob");
        let (convo, _) = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &alice, &bob)
            .unwrap();
        (convo.id, alice, bob)
    }

    #[test]
    fn listing_is_ascending_by_creation_time() {
        let db = test_db();
        let (convo, alice, bob) = seed_conversation(&db);

        for (i, body) in ["first", "second", "third"].iter().enumerate() {
            let ts = format!("2026-01-01T00:00:0{}.000Z", i);
            db.insert_message(&Uuid::new_v4().to_string(), &convo, &alice, &bob, body, &ts)
                .unwrap();
        }

        let listed = db.list_messages(&convo, 50).unwrap();
        let bodies: Vec<&str> = listed.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["first", "second", "third"]);
        for pair in listed.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn soft_delete_replaces_body_once_and_only_once() {
        let db = test_db();
        let (convo, alice, bob) = seed_conversation(&db);
        let moderator = seed_moderator(&db, "mod");

        let mid = Uuid::new_v4().to_string();
        db.insert_message(&mid, &convo, &alice, &bob, "rude things", &now_ts()).unwrap();

        assert!(db.soft_delete_message(&mid, &moderator).unwrap());
        let row = db.get_message(&mid).unwrap().unwrap();
        assert!(row.is_deleted);
        assert_eq!(row.body, MODERATION_PLACEHOLDER);
        assert_eq!(row.deleted_by.as_deref(), Some(moderator.as_str()));
        let first_deleted_at = row.deleted_at.clone();

        // Re-removal is a no-op: body and deletion metadata stay put.
        assert!(!db.soft_delete_message(&mid, &moderator).unwrap());
        let row = db.get_message(&mid).unwrap().unwrap();
        assert_eq!(row.deleted_at, first_deleted_at);
        assert_eq!(row.body, MODERATION_PLACEHOLDER);
    }

    #[test]
    fn purge_batch_respects_cutoff_and_reports_conversations() {
        let db = test_db();
        let (convo, alice, bob) = seed_conversation(&db);

        db.insert_message(
            &Uuid::new_v4().to_string(),
            &convo,
            &alice,
            &bob,
            "ancient",
            "2020-01-01T00:00:00.000Z",
        )
        .unwrap();
        db.insert_message(
            &Uuid::new_v4().to_string(),
            &convo,
            &bob,
            &alice,
            "recent",
            "2030-01-01T00:00:00.000Z",
        )
        .unwrap();

        let (deleted, touched) = db
            .purge_messages_batch("2025-01-01T00:00:00.000Z", 100)
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(touched, vec![convo.clone()]);

        let remaining = db.list_messages(&convo, 50).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].body, "recent");

        // Nothing left under the cutoff.
        let (deleted, touched) = db
            .purge_messages_batch("2025-01-01T00:00:00.000Z", 100)
            .unwrap();
        assert_eq!(deleted, 0);
        assert!(touched.is_empty());
    }
}
