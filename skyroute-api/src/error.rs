use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use skyroute_catalog::{InventoryError, SearchError};
use skyroute_core::{Interrupted, StoreError};
use skyroute_order::BookingError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("Payment {payment_id} captured but booking not recorded")]
    PaidButUnrecorded { payment_id: String },
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg })),
            AppError::Interrupted(reason) => (StatusCode::GATEWAY_TIMEOUT, json!({ "error": reason.to_string() })),
            AppError::PaidButUnrecorded { payment_id } => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "Payment captured but booking could not be recorded",
                    "payment_id": payment_id,
                }),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Unavailable(msg) => AppError::Unavailable(msg),
            StoreError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InvalidSeats(_) => AppError::Validation(err.to_string()),
            InventoryError::InsufficientInventory { .. } => AppError::Conflict(err.to_string()),
            InventoryError::InventoryUnknown(_) => AppError::Conflict(err.to_string()),
            InventoryError::Store(e) => e.into(),
            InventoryError::Interrupted(i) => i.into(),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Invalid(msg) => AppError::Validation(msg),
            SearchError::Store(e) => e.into(),
            SearchError::Interrupted(i) => i.into(),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::Validation(msg),
            BookingError::NotFound(msg) => AppError::NotFound(msg),
            BookingError::CannotCancel { .. } | BookingError::NotReconcilable { .. } => {
                AppError::Conflict(err.to_string())
            }
            BookingError::DownstreamUnavailable(msg) => AppError::Unavailable(msg),
            BookingError::PaidButUnrecorded { payment_id, .. } => AppError::PaidButUnrecorded { payment_id },
            BookingError::Interrupted(i) => i.into(),
            BookingError::InvalidTransition(_) => AppError::Internal(err.to_string()),
            BookingError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyroute_core::models::{BookingStatus, HoldState};

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (BookingError::Validation("bad".into()).into(), StatusCode::BAD_REQUEST),
            (BookingError::NotFound("booking 4".into()).into(), StatusCode::NOT_FOUND),
            (
                BookingError::CannotCancel {
                    status: BookingStatus::Cancelled,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                BookingError::NotReconcilable {
                    state: HoldState::Active,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                InventoryError::InsufficientInventory {
                    requested: 3,
                    available: 1,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (StoreError::unavailable("redis down").into(), StatusCode::SERVICE_UNAVAILABLE),
            (Interrupted::DeadlineExceeded.into(), StatusCode::GATEWAY_TIMEOUT),
            (
                BookingError::PaidButUnrecorded {
                    payment_id: "pay-1".into(),
                    reason: "db down".into(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (StoreError::corrupt("bad row").into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
