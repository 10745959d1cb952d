use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body a message is left with after a moderator takes it down. Once set,
/// the body is immutable.
pub const MODERATION_PLACEHOLDER: &str = "[removed by a moderator]";

/// Title/body written over notifications whose payload references a
/// taken-down message. The notification row itself is never deleted.
pub const MODERATION_NOTIFICATION_TITLE: &str = "Message removed";
pub const MODERATION_NOTIFICATION_BODY: &str =
    "A message in this conversation was removed by moderation.";

/// Conversation previews are capped so listings never carry full bodies.
pub const PREVIEW_MAX_CHARS: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "moderator" => Role::Moderator,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Open,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::Resolved => "resolved",
        }
    }
}

/// Structured notification payload, one variant per notification kind.
/// Stored as JSON text in the notifications table; the serde tag doubles as
/// the row's `kind` column so the two can never drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotificationPayload {
    Message {
        conversation_id: Uuid,
        sender_id: Uuid,
        message_id: Uuid,
    },
    Moderation {
        message_id: Uuid,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationPayload::Message { .. } => "message",
            NotificationPayload::Moderation { .. } => "moderation",
        }
    }
}
