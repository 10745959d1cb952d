use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use parley_db::models::{NotificationRow, parse_ts, parse_ts_opt};
use parley_types::api::{CurrentUser, NotificationListResponse, NotificationResponse};
use parley_types::models::NotificationPayload;

use crate::error::ApiError;
use crate::parse_uuid;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub limit: Option<u32>,
    pub unread_only: Option<bool>,
}

fn notification_response(row: NotificationRow) -> Option<NotificationResponse> {
    let payload: NotificationPayload = match serde_json::from_str(&row.payload) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Corrupt notification payload on '{}': {}", row.id, e);
            return None;
        }
    };

    Some(NotificationResponse {
        id: parse_uuid(&row.id, "notification id"),
        kind: row.kind,
        title: row.title,
        body: row.body,
        link: row.link,
        payload,
        read_at: parse_ts_opt(&row.read_at),
        created_at: parse_ts(&row.created_at),
    })
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(30).clamp(1, 100);
    let unread_only = query.unread_only.unwrap_or(false);

    let uid = user.id.to_string();
    let rows = state.db.list_notifications(&uid, unread_only, limit)?;
    let unread_count = state.db.unread_notification_count(&uid)?;

    let notifications: Vec<NotificationResponse> =
        rows.into_iter().filter_map(notification_response).collect();

    Ok(Json(NotificationListResponse {
        notifications,
        unread_count,
    }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let marked = state.db.mark_all_notifications_read(&user.id.to_string())?;
    Ok(Json(serde_json::json!({ "marked": marked })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    // Already-read is a success no-op; only absence is an error.
    state
        .db
        .mark_notification_read(&id.to_string(), &user.id.to_string())?
        .ok_or_else(|| ApiError::NotFound("notification not found".into()))?;

    Ok(Json(serde_json::json!({ "read": true })))
}
