use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use skyroute_catalog::FlightInventory;
use skyroute_core::models::{
    Flight, FlightValidationRequest, FlightValidationResponse, SearchRequest, SearchResponse, SeatUpdateRequest,
    SortBy,
};
use skyroute_core::CallContext;

use crate::error::AppError;
use crate::state::AppState;

const SEARCH_DEADLINE: Duration = Duration::from_secs(30);
const SEAT_OPS_DEADLINE: Duration = Duration::from_secs(10);

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/flights/search", get(search_flights))
        .route("/api/flights/validate", post(validate_flight))
        .route("/api/flights/seats/decrement", post(decrement_seats))
        .route("/api/flights/seats/increment", post(increment_seats))
        .route("/api/flights/{id}", get(get_flight))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Raw query string; parsed by hand so every bad field gets a 400 with a reason.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub date: Option<String>,
    pub seats: Option<String>,
    pub sort_by: Option<String>,
}

impl SearchParams {
    fn into_request(self) -> Result<SearchRequest, AppError> {
        let (Some(source), Some(destination), Some(date), Some(seats)) = (
            non_empty(self.source),
            non_empty(self.destination),
            non_empty(self.date),
            non_empty(self.seats),
        ) else {
            return Err(AppError::Validation(
                "Missing required parameters: source, destination, date, seats".to_string(),
            ));
        };

        let seats = seats
            .parse::<i32>()
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| AppError::Validation("Invalid seats parameter".to_string()))?;
        let sort_by = self
            .sort_by
            .unwrap_or_default()
            .parse::<SortBy>()
            .map_err(AppError::Validation)?;

        Ok(SearchRequest {
            source,
            destination,
            date: parse_date(&date)?,
            seats,
            sort_by,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", value)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeatUpdateResponse {
    pub message: String,
    pub flight_id: i64,
    pub seats: i32,
    pub date: NaiveDate,
    pub available_seats: i32,
    pub updated_at: DateTime<Utc>,
}

fn ensure_seat_request(flight_id: i64, seats: i32) -> Result<(), AppError> {
    if flight_id <= 0 || seats <= 0 {
        return Err(AppError::Validation("Invalid flight ID, seats, or date".to_string()));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/flights/search
pub async fn search_flights(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let request = params.into_request()?;
    let ctx = CallContext::with_timeout(SEARCH_DEADLINE);

    let response = state.flights.search(&ctx, &request).await?;
    info!(
        source = %request.source,
        destination = %request.destination,
        date = %request.date,
        count = response.count,
        "Flight search completed"
    );
    Ok(Json(response))
}

/// GET /api/flights/{id}
pub async fn get_flight(
    State(state): State<AppState>,
    Path(flight_id): Path<i64>,
) -> Result<Json<Flight>, AppError> {
    if flight_id <= 0 {
        return Err(AppError::Validation("Invalid flight ID".to_string()));
    }
    let ctx = CallContext::with_timeout(SEAT_OPS_DEADLINE);

    state
        .flights
        .get_flight(&ctx, flight_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("flight {}", flight_id)))
}

/// POST /api/flights/validate
///
/// An unknown flight or short inventory is a `valid: false` body, not an error.
pub async fn validate_flight(
    State(state): State<AppState>,
    Json(req): Json<FlightValidationRequest>,
) -> Result<Json<FlightValidationResponse>, AppError> {
    ensure_seat_request(req.flight_id, req.seats)?;
    let ctx = CallContext::with_timeout(SEAT_OPS_DEADLINE);

    let response = state.flights.validate(&ctx, &req).await?;
    info!(flight_id = req.flight_id, valid = response.valid, "Flight validation completed");
    Ok(Json(response))
}

/// POST /api/flights/seats/decrement
pub async fn decrement_seats(
    State(state): State<AppState>,
    Json(req): Json<SeatUpdateRequest>,
) -> Result<Json<SeatUpdateResponse>, AppError> {
    ensure_seat_request(req.flight_id, req.seats)?;
    let ctx = CallContext::with_timeout(SEAT_OPS_DEADLINE);

    // Make sure a counter exists; a cold key would otherwise read as unknown.
    state
        .flights
        .inventory()
        .get_available(&ctx, req.flight_id, req.date)
        .await?;
    let available_seats = state
        .flights
        .decrement_seats(&ctx, req.flight_id, req.date, req.seats)
        .await?;

    Ok(Json(SeatUpdateResponse {
        message: "Seats decremented successfully".to_string(),
        flight_id: req.flight_id,
        seats: req.seats,
        date: req.date,
        available_seats,
        updated_at: Utc::now(),
    }))
}

/// POST /api/flights/seats/increment
pub async fn increment_seats(
    State(state): State<AppState>,
    Json(req): Json<SeatUpdateRequest>,
) -> Result<Json<SeatUpdateResponse>, AppError> {
    ensure_seat_request(req.flight_id, req.seats)?;
    // A release is never abandoned halfway, so no deadline applies once started.
    let available_seats = state
        .flights
        .increment_seats(req.flight_id, req.date, req.seats)
        .await?;

    Ok(Json(SeatUpdateResponse {
        message: "Seats incremented successfully".to_string(),
        flight_id: req.flight_id,
        seats: req.seats,
        date: req.date,
        available_seats,
        updated_at: Utc::now(),
    }))
}
