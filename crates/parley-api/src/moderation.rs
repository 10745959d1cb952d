use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use parley_types::api::{CurrentUser, ReportResponse};

use crate::error::ApiError;
use crate::messages::message_response;
use crate::notify;
use crate::parse_uuid;
use crate::reports::report_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub status: Option<String>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
    Extension(_user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = match query.status.as_deref() {
        None | Some("all") => None,
        Some("open") => Some("open"),
        Some("resolved") => Some("resolved"),
        Some(other) => {
            return Err(ApiError::InvalidArgument(format!(
                "unknown status filter '{}'",
                other
            )));
        }
    };

    let rows = state.db.list_reports(filter)?;
    let reports: Vec<ReportResponse> = rows.into_iter().map(report_response).collect();
    Ok(Json(reports))
}

pub async fn resolve_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .resolve_report(&id.to_string(), &user.id.to_string())?
        .ok_or_else(|| ApiError::NotFound("report not found".into()))?;

    Ok(Json(report_response(row)))
}

/// Takedown ordering matters: the soft-delete must be durable before the
/// notification rewrite and the preview refresh recompute against it.
/// Cascade failures are logged, never rolled back.
pub async fn remove_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .db
        .get_message(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound("message not found".into()))?;

    let newly_deleted = state.db.soft_delete_message(&id.to_string(), &user.id.to_string())?;

    if newly_deleted {
        notify::message_removed(&state.db, id, parse_uuid(&message.sender_id, "sender id"));

        if let Err(e) = state.db.refresh_conversation_preview(&message.conversation_id) {
            error!(
                "preview refresh failed for conversation {}: {:#}",
                message.conversation_id, e
            );
        }
    }

    let updated = state
        .db
        .get_message(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound("message not found".into()))?;

    Ok(Json(message_response(updated)))
}
