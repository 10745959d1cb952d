use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::models::{ReportRow, parse_ts, parse_ts_opt};
use parley_types::api::{CurrentUser, ReportResponse, SubmitReportRequest};
use parley_types::models::ReportStatus;

use crate::error::ApiError;
use crate::parse_uuid;
use crate::rate_limit::Action;
use crate::state::AppState;

const REASON_MAX_CHARS: usize = 2000;

pub(crate) fn report_response(row: ReportRow) -> ReportResponse {
    let status = if row.status == "resolved" {
        ReportStatus::Resolved
    } else {
        ReportStatus::Open
    };

    ReportResponse {
        id: parse_uuid(&row.id, "report id"),
        reporter_id: parse_uuid(&row.reporter_id, "reporter id"),
        target_user_id: parse_uuid(&row.target_user_id, "target user id"),
        message_id: row.message_id.as_deref().map(|id| parse_uuid(id, "message id")),
        conversation_id: row
            .conversation_id
            .as_deref()
            .map(|id| parse_uuid(id, "conversation id")),
        reason: row.reason,
        status,
        resolved_at: parse_ts_opt(&row.resolved_at),
        resolved_by: row.resolved_by.as_deref().map(|id| parse_uuid(id, "moderator id")),
        created_at: parse_ts(&row.created_at),
    }
}

/// A report naming a message or conversation must reference an entity the
/// reporter participates in, and one that actually involves the target user.
pub async fn submit_report(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SubmitReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.limiter.check(user.id, Action::SubmitReport)?;

    let reason = req.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ApiError::InvalidArgument("report reason must not be empty".into()));
    }
    if reason.chars().count() > REASON_MAX_CHARS {
        return Err(ApiError::InvalidArgument(format!(
            "report reason exceeds {} characters",
            REASON_MAX_CHARS
        )));
    }

    if req.target_user_id == user.id {
        return Err(ApiError::InvalidArgument("cannot report yourself".into()));
    }
    if !state.db.user_exists(&req.target_user_id.to_string())? {
        return Err(ApiError::NotFound("user not found".into()));
    }

    let reporter = user.id.to_string();
    let target = req.target_user_id.to_string();
    let mut conversation_id = req.conversation_id.map(|id| id.to_string());

    if let Some(message_id) = req.message_id {
        let message = state
            .db
            .get_message(&message_id.to_string())?
            .ok_or_else(|| ApiError::NotFound("message not found".into()))?;

        if message.sender_id != reporter && message.recipient_id != reporter {
            return Err(ApiError::Forbidden(
                "not a participant in the reported message".into(),
            ));
        }
        if message.sender_id != target && message.recipient_id != target {
            return Err(ApiError::InvalidArgument(
                "reported message does not involve the target user".into(),
            ));
        }
        if let Some(cid) = &conversation_id {
            if &message.conversation_id != cid {
                return Err(ApiError::InvalidArgument(
                    "message does not belong to the given conversation".into(),
                ));
            }
        }
        conversation_id = Some(message.conversation_id);
    } else if let Some(cid) = &conversation_id {
        let convo = state
            .db
            .get_conversation(cid)?
            .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;

        if !convo.has_participant(&reporter) {
            return Err(ApiError::Forbidden(
                "not a participant in the reported conversation".into(),
            ));
        }
        if !convo.has_participant(&target) {
            return Err(ApiError::InvalidArgument(
                "reported conversation does not involve the target user".into(),
            ));
        }
    }

    let report_id = Uuid::new_v4().to_string();
    state.db.insert_report(
        &report_id,
        &reporter,
        &target,
        req.message_id.map(|id| id.to_string()).as_deref(),
        conversation_id.as_deref(),
        &reason,
    )?;

    let row = state
        .db
        .get_report(&report_id)?
        .ok_or_else(|| anyhow::anyhow!("report missing immediately after insert"))?;

    Ok((StatusCode::CREATED, Json(report_response(row))))
}
