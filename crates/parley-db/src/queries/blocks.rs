use crate::models::BlockRow;
use crate::{Database, now_ts};
use anyhow::Result;

impl Database {
    /// True iff a block exists in either direction between the two users.
    pub fn is_blocked_between(&self, user_a: &str, user_b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let blocked: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM blocks
                     WHERE (blocker_id = ?1 AND blocked_id = ?2)
                        OR (blocker_id = ?2 AND blocked_id = ?1))",
                [user_a, user_b],
                |row| row.get(0),
            )?;
            Ok(blocked)
        })
    }

    /// Idempotent: re-blocking an already blocked user is a no-op.
    pub fn create_block(&self, blocker_id: &str, blocked_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![blocker_id, blocked_id, now_ts()],
            )?;
            Ok(())
        })
    }

    /// Idempotent: unblocking an absent block is a no-op.
    pub fn delete_block(&self, blocker_id: &str, blocked_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                [blocker_id, blocked_id],
            )?;
            Ok(())
        })
    }

    /// Two independent directed lookups. A user can simultaneously block and
    /// be blocked by the same counterpart.
    pub fn block_status(&self, user_id: &str, other_id: &str) -> Result<(bool, bool)> {
        self.with_conn(|conn| {
            let blocked: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2)",
                [user_id, other_id],
                |row| row.get(0),
            )?;
            let blocked_by: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2)",
                [other_id, user_id],
                |row| row.get(0),
            )?;
            Ok((blocked, blocked_by))
        })
    }

    pub fn list_blocks_for_user(&self, blocker_id: &str) -> Result<Vec<BlockRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT b.blocker_id, b.blocked_id, u.username, b.created_at
                 FROM blocks b
                 JOIN users u ON u.id = b.blocked_id
                 WHERE b.blocker_id = ?1
                 ORDER BY b.created_at DESC",
            )?;

            let rows = stmt
                .query_map([blocker_id], |row| {
                    Ok(BlockRow {
                        blocker_id: row.get(0)?,
                        blocked_id: row.get(1)?,
                        blocked_username: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::testutil::{seed_user, test_db};

    #[test]
    fn block_is_directional_but_checked_both_ways() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        assert!(!db.is_blocked_between(&alice, &bob).unwrap());

        db.create_block(&alice, &bob).unwrap();
        assert!(db.is_blocked_between(&alice, &bob).unwrap());
        assert!(db.is_blocked_between(&bob, &alice).unwrap());

        let (blocked, blocked_by) = db.block_status(&alice, &bob).unwrap();
        assert!(blocked);
        assert!(!blocked_by);

        let (blocked, blocked_by) = db.block_status(&bob, &alice).unwrap();
        assert!(!blocked);
        assert!(blocked_by);
    }

    #[test]
    fn reblocking_and_unblocking_are_idempotent() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        db.create_block(&alice, &bob).unwrap();
        db.create_block(&alice, &bob).unwrap();
        assert_eq!(db.list_blocks_for_user(&alice).unwrap().len(), 1);

        db.delete_block(&alice, &bob).unwrap();
        db.delete_block(&alice, &bob).unwrap();
        assert!(db.list_blocks_for_user(&alice).unwrap().is_empty());
        assert!(!db.is_blocked_between(&alice, &bob).unwrap());
    }

    #[test]
    fn mutual_blocks_coexist() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        db.create_block(&alice, &bob).unwrap();
        db.create_block(&bob, &alice).unwrap();

        let (blocked, blocked_by) = db.block_status(&alice, &bob).unwrap();
        assert!(blocked && blocked_by);

        // Removing one direction leaves the other intact.
        db.delete_block(&alice, &bob).unwrap();
        assert!(db.is_blocked_between(&alice, &bob).unwrap());
    }
}
