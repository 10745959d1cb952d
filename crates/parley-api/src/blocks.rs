use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::models::parse_ts;
use parley_types::api::{BlockRequest, BlockStatusResponse, BlockedUser, CurrentUser};

use crate::error::ApiError;
use crate::parse_uuid;
use crate::state::AppState;

pub async fn list_blocks(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.list_blocks_for_user(&user.id.to_string())?;

    let blocked: Vec<BlockedUser> = rows
        .into_iter()
        .map(|row| BlockedUser {
            user_id: parse_uuid(&row.blocked_id, "user id"),
            username: row.blocked_username,
            created_at: parse_ts(&row.created_at),
        })
        .collect();

    Ok(Json(blocked))
}

pub async fn block_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let (blocked, blocked_by) = state
        .db
        .block_status(&user.id.to_string(), &user_id.to_string())?;

    Ok(Json(BlockStatusResponse { blocked, blocked_by }))
}

pub async fn create_block(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<BlockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.user_id == user.id {
        return Err(ApiError::InvalidArgument("cannot block yourself".into()));
    }

    if !state.db.user_exists(&req.user_id.to_string())? {
        return Err(ApiError::NotFound("user not found".into()));
    }

    state.db.create_block(&user.id.to_string(), &req.user_id.to_string())?;

    Ok(Json(serde_json::json!({ "blocked": true })))
}

pub async fn delete_block(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.delete_block(&user.id.to_string(), &user_id.to_string())?;

    Ok(Json(serde_json::json!({ "blocked": false })))
}
