use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use parley_db::models::{MessageRow, parse_ts, parse_ts_opt};
use parley_db::now_ts;
use parley_types::api::{CurrentUser, MessageResponse, SendMessageRequest};

use crate::conversations::authorize_conversation;
use crate::error::ApiError;
use crate::notify;
use crate::parse_uuid;
use crate::rate_limit::Action;
use crate::state::AppState;

/// Body length bounds, applied after trimming.
const BODY_MAX_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
}

pub(crate) fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_uuid(&row.id, "message id"),
        conversation_id: parse_uuid(&row.conversation_id, "conversation id"),
        sender_id: parse_uuid(&row.sender_id, "sender id"),
        recipient_id: parse_uuid(&row.recipient_id, "recipient id"),
        body: row.body,
        is_deleted: row.is_deleted,
        read_at: parse_ts_opt(&row.read_at),
        created_at: parse_ts(&row.created_at),
    }
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_conversation(&state.db, conversation_id, user.id)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    // Run the blocking scan off the async runtime
    let db = state.clone();
    let cid = conversation_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.list_messages(&cid, limit))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            anyhow::anyhow!("message listing task failed")
        })??;

    let messages: Vec<MessageResponse> = rows.into_iter().map(message_response).collect();
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.limiter.check(user.id, Action::SendMessage)?;

    let convo = authorize_conversation(&state.db, conversation_id, user.id)?;

    let body = req.body.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::InvalidArgument("message body must not be empty".into()));
    }
    if body.chars().count() > BODY_MAX_CHARS {
        return Err(ApiError::InvalidArgument(format!(
            "message body exceeds {} characters",
            BODY_MAX_CHARS
        )));
    }

    // The recipient is derived, never user-supplied.
    let uid = user.id.to_string();
    let recipient = convo
        .other_participant(&uid)
        .ok_or_else(|| ApiError::Forbidden("not a participant in this conversation".into()))?
        .to_string();
    let recipient_id = parse_uuid(&recipient, "recipient id");

    let message_id = Uuid::new_v4();
    let created_at = now_ts();

    // Run the blocking insert off the async runtime
    {
        let db = state.clone();
        let mid = message_id.to_string();
        let cid = conversation_id.to_string();
        let sid = uid.clone();
        let rid = recipient.clone();
        let body = body.clone();
        let ts = created_at.clone();
        tokio::task::spawn_blocking(move || {
            db.db.insert_message(&mid, &cid, &sid, &rid, &body, &ts)
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            anyhow::anyhow!("message insert task failed")
        })??;
    }

    // The message is durable from here on. Cascades may fail individually;
    // they are logged for reconciliation, never rolled back.
    if let Err(e) = state.db.refresh_conversation_preview(&conversation_id.to_string()) {
        error!("preview refresh failed for conversation {}: {:#}", conversation_id, e);
    }
    notify::message_created(
        &state.db,
        conversation_id,
        message_id,
        user.id,
        &user.username,
        recipient_id,
        &body,
    );

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            conversation_id,
            sender_id: user.id,
            recipient_id,
            body,
            is_deleted: false,
            read_at: None,
            created_at: parse_ts(&created_at),
        }),
    ))
}
