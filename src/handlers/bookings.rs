//! # Booking Handlers
//!
//! No provider supports booking yet; both endpoints answer 501 once the
//! provider is resolved.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::booking::{BookingConfirmation, BookingRequest};
use crate::error::ApiError;
use crate::server::AppState;

#[utoipa::path(
    post,
    path = "/providers/{id}/bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Provider id")),
    request_body = BookingRequest,
    responses(
        (status = 201, description = "Booking confirmed", body = BookingConfirmation),
        (status = 404, description = "Unknown provider", body = ApiError),
        (status = 501, description = "Provider does not support booking", body = ApiError)
    ),
    tag = "bookings"
)]
pub async fn create_booking(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingConfirmation>), ApiError> {
    let Json(request) = payload?;
    let confirmation = state.bookings.book(id, &request).await?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}

#[utoipa::path(
    delete,
    path = "/providers/{id}/bookings/{booking_id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Provider id"),
        ("booking_id" = String, Path, description = "Provider booking reference")
    ),
    responses(
        (status = 204, description = "Booking cancelled"),
        (status = 404, description = "Unknown provider", body = ApiError),
        (status = 501, description = "Provider does not support cancellation", body = ApiError)
    ),
    tag = "bookings"
)]
pub async fn cancel_booking(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path((id, booking_id)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    state.bookings.cancel(id, &booking_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
