//! Waitlist endpoints

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::waitlist::{JoinWaitlistRequest, WaitlistEntry},
    AppState,
};

use super::AuthenticatedUser;

/// Join the waitlist for a device
#[utoipa::path(
    post,
    path = "/waitlist",
    tag = "waitlist",
    security(("bearer_auth" = [])),
    request_body = JoinWaitlistRequest,
    responses(
        (status = 201, description = "Added to the waitlist", body = WaitlistEntry),
        (status = 404, description = "Device not found"),
        (status = 409, description = "Already waiting for this device")
    )
)]
pub async fn join_waitlist(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<JoinWaitlistRequest>,
) -> AppResult<(StatusCode, Json<WaitlistEntry>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let entry = state
        .services
        .waitlist
        .join(&claims, &request.device_id)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// The caller's waitlist entries, newest first
#[utoipa::path(
    get,
    path = "/waitlist/me",
    tag = "waitlist",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Waitlist entries", body = Vec<WaitlistEntry>)
    )
)]
pub async fn get_my_waitlist(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<WaitlistEntry>>> {
    let entries = state
        .services
        .waitlist
        .get_user_waitlist(claims.user_id())
        .await?;
    Ok(Json(entries))
}
