use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use parley_types::api::{Claims, CurrentUser};
use parley_types::models::Role;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the bearer JWT from the Authorization header.
///
/// Tokens are minted by the platform's identity service; this middleware is
/// the whole of Parley's authentication surface. The derived [`CurrentUser`]
/// is inserted as a request extension for handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    req.extensions_mut().insert(CurrentUser::from(token_data.claims));
    Ok(next.run(req).await)
}

/// Layered after `require_auth` on /moderation routes.
pub async fn require_moderator(req: Request, next: Next) -> Result<Response, ApiError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or(ApiError::Unauthorized)?;

    if user.role != Role::Moderator {
        return Err(ApiError::Forbidden("moderator access required".into()));
    }

    Ok(next.run(req).await)
}
