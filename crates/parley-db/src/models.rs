/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.
use chrono::{DateTime, Utc};
use tracing::warn;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub role: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationRow {
    /// The counterpart of `user_id` in this two-party conversation, or None
    /// if `user_id` is not a participant.
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        if self.participant_a == user_id {
            Some(&self.participant_b)
        } else if self.participant_b == user_id {
            Some(&self.participant_a)
        } else {
            None
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }
}

/// One row of the conversation listing: the conversation joined with the
/// other participant and its unread count for the requesting user.
pub struct ConversationListRow {
    pub id: String,
    pub other_user_id: String,
    pub other_username: String,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<String>,
    pub unread_count: i64,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub deleted_by: Option<String>,
    pub read_at: Option<String>,
    pub created_at: String,
}

pub struct BlockRow {
    pub blocker_id: String,
    pub blocked_id: String,
    pub blocked_username: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub payload: String,
    pub read_at: Option<String>,
    pub created_at: String,
}

pub struct ReportRow {
    pub id: String,
    pub reporter_id: String,
    pub target_user_id: String,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    pub reason: String,
    pub status: String,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: String,
}

/// Parse a stored timestamp back into `DateTime<Utc>`.
///
/// Rows written by the application carry fixed-width RFC 3339; rows created
/// through column defaults carry SQLite's `datetime('now')` shape, so both
/// are accepted.
pub fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn parse_ts_opt(raw: &Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().map(parse_ts)
}
