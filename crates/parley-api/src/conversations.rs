use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::{ConversationRow, parse_ts, parse_ts_opt};
use parley_types::api::{
    ConversationSummary, CreateConversationRequest, CurrentUser, UnreadCountResponse,
};

use crate::error::ApiError;
use crate::parse_uuid;
use crate::rate_limit::Action;
use crate::state::AppState;

/// Authorization gate shared by every per-conversation operation: the
/// conversation must exist, the caller must participate, and no block may
/// exist in either direction. Runs before any side effect.
pub(crate) fn authorize_conversation(
    db: &Database,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<ConversationRow, ApiError> {
    let convo = db
        .get_conversation(&conversation_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;

    let uid = user_id.to_string();
    let Some(other) = convo.other_participant(&uid) else {
        return Err(ApiError::Forbidden("not a participant in this conversation".into()));
    };

    if db.is_blocked_between(&uid, other)? {
        return Err(ApiError::blocked());
    }

    Ok(convo)
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.list_conversations_for_user(&user.id.to_string())?;

    let summaries: Vec<ConversationSummary> = rows
        .into_iter()
        .map(|row| ConversationSummary {
            id: parse_uuid(&row.id, "conversation id"),
            other_user_id: parse_uuid(&row.other_user_id, "user id"),
            other_username: row.other_username,
            last_message_text: row.last_message_text,
            last_message_at: parse_ts_opt(&row.last_message_at),
            unread_count: row.unread_count,
            created_at: parse_ts(&row.created_at),
        })
        .collect();

    Ok(Json(summaries))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.limiter.check(user.id, Action::CreateConversation)?;

    if req.recipient_id == user.id {
        return Err(ApiError::InvalidArgument(
            "cannot start a conversation with yourself".into(),
        ));
    }

    let recipient = state
        .db
        .get_user_by_id(&req.recipient_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    if state.db.is_blocked_between(&user.id.to_string(), &recipient.id)? {
        return Err(ApiError::blocked());
    }

    let (row, created) = state.db.get_or_create_conversation(
        &Uuid::new_v4().to_string(),
        &user.id.to_string(),
        &recipient.id,
    )?;

    let unread = state.db.conversation_unread_count(&row.id, &user.id.to_string())?;

    let summary = ConversationSummary {
        id: parse_uuid(&row.id, "conversation id"),
        other_user_id: req.recipient_id,
        other_username: recipient.username,
        last_message_text: row.last_message_text,
        last_message_at: parse_ts_opt(&row.last_message_at),
        unread_count: unread,
        created_at: parse_ts(&row.created_at),
    };

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(summary)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let unread = state.db.total_unread_count(&user.id.to_string())?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_conversation(&state.db, conversation_id, user.id)?;

    let (messages, notifications) = state
        .db
        .mark_conversation_read(&conversation_id.to_string(), &user.id.to_string())?;

    Ok(Json(serde_json::json!({
        "messages_read": messages,
        "notifications_read": notifications,
    })))
}
