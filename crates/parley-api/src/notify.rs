//! Fan-out of domain events into per-user notification inboxes.
//!
//! Persistence is the only delivery guarantee: a notification exists once
//! its row does. The send and moderation paths call the `*_created` /
//! `*_removed` wrappers, which log dispatch failures instead of propagating
//! them; a failed cascade never rolls back a durable primary effect.

use anyhow::Result;
use tracing::{debug, error};
use uuid::Uuid;

use parley_db::{Database, now_ts};
use parley_types::models::{
    MODERATION_NOTIFICATION_BODY, MODERATION_NOTIFICATION_TITLE, NotificationPayload,
};

const MESSAGE_REMOVED_AUTHOR_TITLE: &str = "Your message was removed";
const MESSAGE_REMOVED_AUTHOR_BODY: &str =
    "A moderator removed one of your messages for violating the platform rules.";

pub fn emit(
    db: &Database,
    user_id: Uuid,
    title: &str,
    body: &str,
    link: Option<&str>,
    payload: &NotificationPayload,
) -> Result<()> {
    let payload_json = serde_json::to_string(payload)?;
    db.insert_notification(
        &Uuid::new_v4().to_string(),
        &user_id.to_string(),
        payload.kind(),
        title,
        body,
        link,
        &payload_json,
        &now_ts(),
    )
}

/// Send-path fan-out: tell the recipient a message arrived.
pub fn message_created(
    db: &Database,
    conversation_id: Uuid,
    message_id: Uuid,
    sender_id: Uuid,
    sender_username: &str,
    recipient_id: Uuid,
    body: &str,
) {
    let title = format!("New message from {}", sender_username);
    let link = format!("/conversations/{}", conversation_id);
    let payload = NotificationPayload::Message {
        conversation_id,
        sender_id,
        message_id,
    };

    if let Err(e) = emit(db, recipient_id, &title, body, Some(&link), &payload) {
        error!("notification dispatch failed for message {}: {:#}", message_id, e);
    }
}

/// Moderation cascade: redact every notification referencing the taken-down
/// message, then tell its author.
pub fn message_removed(db: &Database, message_id: Uuid, sender_id: Uuid) {
    match db.rewrite_notifications_for_message(
        &message_id.to_string(),
        MODERATION_NOTIFICATION_TITLE,
        MODERATION_NOTIFICATION_BODY,
    ) {
        Ok(rewritten) => debug!("redacted {} notifications for message {}", rewritten, message_id),
        Err(e) => error!("notification rewrite failed for message {}: {:#}", message_id, e),
    }

    let payload = NotificationPayload::Moderation { message_id };
    if let Err(e) = emit(
        db,
        sender_id,
        MESSAGE_REMOVED_AUTHOR_TITLE,
        MESSAGE_REMOVED_AUTHOR_BODY,
        None,
        &payload,
    ) {
        error!("takedown notice failed for message {}: {:#}", message_id, e);
    }
}
