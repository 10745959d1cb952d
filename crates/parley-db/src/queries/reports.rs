use crate::models::ReportRow;
use crate::{Database, now_ts};
use anyhow::Result;
use rusqlite::Row;

use super::OptionalExt;

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        reporter_id: row.get(1)?,
        target_user_id: row.get(2)?,
        message_id: row.get(3)?,
        conversation_id: row.get(4)?,
        reason: row.get(5)?,
        status: row.get(6)?,
        resolved_at: row.get(7)?,
        resolved_by: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const REPORT_COLUMNS: &str = "id, reporter_id, target_user_id, message_id, conversation_id, \
     reason, status, resolved_at, resolved_by, created_at";

impl Database {
    pub fn insert_report(
        &self,
        id: &str,
        reporter_id: &str,
        target_user_id: &str,
        message_id: Option<&str>,
        conversation_id: Option<&str>,
        reason: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reports (id, reporter_id, target_user_id, message_id, conversation_id, reason, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7)",
                rusqlite::params![id, reporter_id, target_user_id, message_id, conversation_id, reason, now_ts()],
            )?;
            Ok(())
        })
    }

    pub fn get_report(&self, id: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"))?;
            let row = stmt.query_row([id], report_from_row).optional()?;
            Ok(row)
        })
    }

    /// `status` of None lists everything.
    pub fn list_reports(&self, status: Option<&str>) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let rows = match status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {REPORT_COLUMNS} FROM reports
                         WHERE status = ?1
                         ORDER BY created_at DESC, id DESC"
                    ))?;
                    stmt.query_map([status], report_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {REPORT_COLUMNS} FROM reports
                         ORDER BY created_at DESC, id DESC"
                    ))?;
                    stmt.query_map([], report_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Idempotent: re-resolving keeps the original resolution metadata and
    /// succeeds. Returns the row after the update, or None if absent.
    pub fn resolve_report(&self, id: &str, moderator_id: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE reports
                    SET status = 'resolved',
                        resolved_at = COALESCE(resolved_at, ?2),
                        resolved_by = COALESCE(resolved_by, ?3)
                  WHERE id = ?1",
                rusqlite::params![id, now_ts(), moderator_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let mut stmt =
                conn.prepare(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"))?;
            let row = stmt.query_row([id], report_from_row).optional()?;
            Ok(row)
        })
    }

    /// One retention batch: only resolved reports whose resolution is older
    /// than the cutoff. Open reports survive regardless of age.
    pub fn purge_resolved_reports_batch(&self, cutoff: &str, limit: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM reports WHERE id IN (
                    SELECT id FROM reports
                     WHERE status = 'resolved'
                       AND resolved_at IS NOT NULL
                       AND resolved_at < ?1
                     LIMIT ?2)",
                rusqlite::params![cutoff, limit],
            )?;
            Ok(deleted)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::testutil::{seed_moderator, seed_user, test_db};
    use uuid::Uuid;

    #[test]
    fn resolution_is_idempotent_and_keeps_first_resolver() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let first_mod = seed_moderator(&db, "mod1");
        let second_mod = seed_moderator(&db, "mod2");

        let id = Uuid::new_v4().to_string();
        db.insert_report(&id, &alice, &bob, None, None, "spam").unwrap();

        let resolved = db.resolve_report(&id, &first_mod).unwrap().unwrap();
        assert_eq!(resolved.status, "resolved");
        assert_eq!(resolved.resolved_by.as_deref(), Some(first_mod.as_str()));
        let first_ts = resolved.resolved_at.clone();

        let again = db.resolve_report(&id, &second_mod).unwrap().unwrap();
        assert_eq!(again.resolved_by.as_deref(), Some(first_mod.as_str()));
        assert_eq!(again.resolved_at, first_ts);

        assert!(db.resolve_report(&Uuid::new_v4().to_string(), &first_mod).unwrap().is_none());
    }

    #[test]
    fn listing_filters_by_status_newest_first() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let moderator = seed_moderator(&db, "mod");

        let open_id = Uuid::new_v4().to_string();
        let resolved_id = Uuid::new_v4().to_string();
        db.insert_report(&open_id, &alice, &bob, None, None, "harassment").unwrap();
        db.insert_report(&resolved_id, &bob, &alice, None, None, "spam").unwrap();
        db.resolve_report(&resolved_id, &moderator).unwrap();

        assert_eq!(db.list_reports(None).unwrap().len(), 2);
        let open = db.list_reports(Some("open")).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, open_id);
        let resolved = db.list_reports(Some("resolved")).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, resolved_id);
    }

    #[test]
    fn purge_never_touches_open_reports() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let moderator = seed_moderator(&db, "mod");

        let old_open = Uuid::new_v4().to_string();
        let old_resolved = Uuid::new_v4().to_string();
        db.insert_report(&old_open, &alice, &bob, None, None, "ancient but open").unwrap();
        db.insert_report(&old_resolved, &bob, &alice, None, None, "ancient, resolved").unwrap();
        db.resolve_report(&old_resolved, &moderator).unwrap();

        // Resolution just happened, so a future cutoff catches it; the open
        // report is never eligible no matter the cutoff.
        let deleted = db
            .purge_resolved_reports_batch("9999-01-01T00:00:00.000Z", 100)
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = db.list_reports(None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, old_open);
    }
}
