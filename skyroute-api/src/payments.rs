use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use std::time::Duration;
use tracing::info;

use skyroute_core::payment::{PaymentGateway, PaymentOutcome, PaymentRequest, PaymentStatus};
use skyroute_core::CallContext;
use skyroute_order::ForcedOutcome;

use crate::error::AppError;
use crate::state::AppState;

const PAYMENT_DEADLINE: Duration = Duration::from_secs(30);

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/payments/process", post(process_payment))
        .route("/api/payments/simulate/{outcome}", post(simulate_payment))
}

fn ensure_payment_request(req: &PaymentRequest) -> Result<(), AppError> {
    if req.booking_id <= 0 || req.amount <= 0.0 || req.user_id <= 0 {
        return Err(AppError::Validation(
            "Invalid booking ID, amount, or user ID".to_string(),
        ));
    }
    Ok(())
}

/// Declines answer 400 and gateway timeouts 408, each with the outcome body.
fn outcome_status(outcome: &PaymentOutcome) -> StatusCode {
    match outcome.status {
        PaymentStatus::Success | PaymentStatus::Pending => StatusCode::OK,
        PaymentStatus::Failed => StatusCode::BAD_REQUEST,
        PaymentStatus::Timeout => StatusCode::REQUEST_TIMEOUT,
    }
}

async fn charge(gateway: &dyn PaymentGateway, req: &PaymentRequest) -> Result<PaymentOutcome, AppError> {
    let ctx = CallContext::with_timeout(PAYMENT_DEADLINE);
    ctx.run(gateway.process(req))
        .await?
        .map_err(|e| AppError::Unavailable(e.to_string()))
}

/// POST /api/payments/process
pub async fn process_payment(
    State(state): State<AppState>,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentOutcome>), AppError> {
    ensure_payment_request(&req)?;

    let outcome = charge(state.payments.as_ref(), &req).await?;
    info!(booking_id = req.booking_id, status = ?outcome.status, "Payment request completed");
    Ok((outcome_status(&outcome), Json(outcome)))
}

/// POST /api/payments/simulate/{success|failure|timeout}
///
/// Runs the simulator with its outcome pinned, for exercising saga paths.
pub async fn simulate_payment(
    State(state): State<AppState>,
    Path(forced): Path<ForcedOutcome>,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentOutcome>), AppError> {
    ensure_payment_request(&req)?;

    let outcome = charge(&state.simulator.forced(forced), &req).await?;
    info!(booking_id = req.booking_id, forced = ?forced, status = ?outcome.status, "Payment simulated");
    Ok((outcome_status(&outcome), Json(outcome)))
}
