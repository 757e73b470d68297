use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use skyroute_core::models::{Booking, BookingRequest, BookingResponse, BookingStatus};
use skyroute_core::CallContext;
use skyroute_order::{BookingError, ReconcileRequest};

use crate::error::AppError;
use crate::state::AppState;

const BOOKING_DEADLINE: Duration = Duration::from_secs(60);
const LOOKUP_DEADLINE: Duration = Duration::from_secs(10);
const CANCEL_DEADLINE: Duration = Duration::from_secs(30);

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/reconcile", post(reconcile_booking))
        .route("/api/bookings/{id}", get(get_booking))
        .route("/api/bookings/{id}/cancel", put(cancel_booking))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub message: String,
    pub booking_id: i64,
    pub status: BookingStatus,
    pub cancelled_at: DateTime<Utc>,
}

/// Failed sagas answer 400, parked ones 202; the body says why either way.
fn saga_status(response: &BookingResponse) -> StatusCode {
    match response.status {
        BookingStatus::Confirmed => StatusCode::OK,
        BookingStatus::Pending => StatusCode::ACCEPTED,
        BookingStatus::Failed | BookingStatus::Cancelled => StatusCode::BAD_REQUEST,
    }
}

fn ensure_booking_id(booking_id: i64) -> Result<(), AppError> {
    if booking_id <= 0 {
        return Err(AppError::Validation("Invalid booking ID".to_string()));
    }
    Ok(())
}

/// Run a saga on its own task. Axum drops a handler's future when the client
/// disconnects; the saga must still reach a terminal or parked state.
async fn detached<F>(saga: F) -> Result<BookingResponse, AppError>
where
    F: Future<Output = Result<BookingResponse, BookingError>> + Send + 'static,
{
    tokio::spawn(saga)
        .await
        .map_err(|e| AppError::Internal(format!("booking task failed: {}", e)))?
        .map_err(AppError::from)
}

/// POST /api/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let ctx = CallContext::with_timeout(BOOKING_DEADLINE);

    let bookings = Arc::clone(&state.bookings);
    let request = req.clone();
    let response = detached(async move { bookings.create_booking(&ctx, &request).await }).await?;
    info!(
        user_id = req.user_id,
        flight_id = req.flight_id,
        booking_id = ?response.booking_id,
        status = %response.status,
        "Booking request completed"
    );
    Ok((saga_status(&response), Json(response)))
}

/// GET /api/bookings/{id}
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> Result<Json<Booking>, AppError> {
    ensure_booking_id(booking_id)?;
    let ctx = CallContext::with_timeout(LOOKUP_DEADLINE);

    let booking = state.bookings.get_booking(&ctx, booking_id).await?;
    Ok(Json(booking))
}

/// PUT /api/bookings/{id}/cancel
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> Result<Json<CancelResponse>, AppError> {
    ensure_booking_id(booking_id)?;
    let ctx = CallContext::with_timeout(CANCEL_DEADLINE);

    let booking = state.bookings.cancel_booking(&ctx, booking_id).await?;
    Ok(Json(CancelResponse {
        message: "Booking cancelled successfully".to_string(),
        booking_id: booking.id,
        status: booking.status,
        cancelled_at: Utc::now(),
    }))
}

/// POST /api/bookings/reconcile
///
/// Operator hook for sagas left `pending` by an unknown payment outcome.
pub async fn reconcile_booking(
    State(state): State<AppState>,
    Json(req): Json<ReconcileRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let ctx = CallContext::with_timeout(BOOKING_DEADLINE);

    let bookings = Arc::clone(&state.bookings);
    let response = detached(async move {
        bookings
            .reconcile_pending(&ctx, req.user_id, req.flight_id, req.resolution)
            .await
    })
    .await?;
    Ok((saga_status(&response), Json(response)))
}
