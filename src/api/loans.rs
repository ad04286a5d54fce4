//! Loan lifecycle endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanQuery, ReservationReceipt},
    AppState,
};

use super::AuthenticatedUser;

/// Reserve device request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReserveDeviceRequest {
    /// Device to reserve
    #[validate(length(min = 1, message = "Device ID is required"))]
    pub device_id: String,
}

/// Reserve a device for the authenticated user
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = ReserveDeviceRequest,
    responses(
        (status = 201, description = "Device reserved", body = ReservationReceipt),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Device not found"),
        (status = 409, description = "Device unavailable, or already reserved or on loan")
    )
)]
pub async fn reserve_device(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ReserveDeviceRequest>,
) -> AppResult<(StatusCode, Json<ReservationReceipt>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let receipt = state
        .services
        .loans
        .reserve_device(claims.user_id(), &request.device_id)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// List loans. Students only see their own.
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Matching loans", body = Vec<Loan>),
        (status = 403, description = "Listing another user's loans")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(mut query): Query<LoanQuery>,
) -> AppResult<Json<Vec<Loan>>> {
    if let Some(user_id) = &query.user_id {
        claims.require_self_or_staff(user_id)?;
    } else if !claims.is_staff() {
        query.user_id = Some(claims.user_id().to_string());
    }

    let loans = state.services.loans.list_loans(&query).await?;
    Ok(Json(loans))
}

/// Overdue loans, persisting newly detected ones
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = Vec<Loan>),
        (status = 403, description = "Staff access required")
    )
)]
pub async fn get_overdue_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Loan>>> {
    claims.require_staff()?;

    let loans = state.services.loans.get_overdue_loans().await?;
    Ok(Json(loans))
}

#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan details", body = Loan),
        (status = 403, description = "Loan belongs to another user"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.get_loan(id).await?;
    claims.require_self_or_staff(&loan.user_id)?;
    Ok(Json(loan))
}

/// Hand a reserved device to its borrower
#[utoipa::path(
    post,
    path = "/loans/{id}/collect",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Device collected", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Loan is not reserved")
    )
)]
pub async fn collect_device(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Loan>> {
    claims.require_staff()?;

    let loan = state.services.loans.collect_device(id).await?;
    Ok(Json(loan))
}

/// Check a device back in
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Device returned", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Loan is not collected")
    )
)]
pub async fn return_device(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Loan>> {
    claims.require_staff()?;

    let loan = state.services.loans.return_device(id).await?;
    Ok(Json(loan))
}

/// Cancel one's own reservation
#[utoipa::path(
    delete,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Loan ID")),
    responses(
        (status = 204, description = "Reservation cancelled"),
        (status = 403, description = "Loan belongs to another user"),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Loan already collected or returned")
    )
)]
pub async fn cancel_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .services
        .loans
        .cancel_loan(id, claims.user_id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
