//! Flight-side saga steps against a remote flight service, for deployments
//! where search and seat inventory run in their own process.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use skyroute_catalog::{FlightInventory, InventoryError};
use skyroute_core::keys;
use skyroute_core::models::{FlightValidationRequest, FlightValidationResponse, SeatUpdateRequest};
use skyroute_core::{CallContext, StoreError};

#[derive(Debug, Deserialize)]
struct SeatCount {
    available_seats: i32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for `/api/flights/validate` and `/api/flights/seats/{decrement,increment}`.
///
/// Transport failures and 5xx replies surface as `Store(Unavailable)`: for a
/// decrement that is an unknown outcome, since the server may have applied it.
#[derive(Debug, Clone)]
pub struct HttpFlightInventory {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpFlightInventory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, InventoryError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(StoreError::unavailable)?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, InventoryError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Calling flight service");
        self.http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| InventoryError::Store(StoreError::unavailable(e)))
    }

    async fn seat_update(&self, path: &str, request: &SeatUpdateRequest) -> Result<i32, InventoryError> {
        let response = self.post(path, request).await?;
        match response.status() {
            StatusCode::OK => Ok(read_json::<SeatCount>(response).await?.available_seats),
            StatusCode::BAD_REQUEST => Err(InventoryError::InvalidSeats(request.seats)),
            StatusCode::CONFLICT => {
                let body = read_json::<ErrorBody>(response).await?;
                Err(seat_conflict(&body.error, request))
            }
            other => Err(unexpected(other)),
        }
    }
}

#[async_trait]
impl FlightInventory for HttpFlightInventory {
    async fn validate(
        &self,
        ctx: &CallContext,
        request: &FlightValidationRequest,
    ) -> Result<FlightValidationResponse, InventoryError> {
        let response = ctx.run(self.post("/api/flights/validate", request)).await??;
        match response.status() {
            StatusCode::OK => read_json(response).await,
            StatusCode::BAD_REQUEST => Err(InventoryError::InvalidSeats(request.seats)),
            other => Err(unexpected(other)),
        }
    }

    /// Checked against the caller's context before sending, never after.
    async fn decrement_seats(
        &self,
        ctx: &CallContext,
        flight_id: i64,
        date: NaiveDate,
        seats: i32,
    ) -> Result<i32, InventoryError> {
        ctx.check()?;
        self.seat_update(
            "/api/flights/seats/decrement",
            &SeatUpdateRequest { flight_id, seats, date },
        )
        .await
    }

    async fn increment_seats(&self, flight_id: i64, date: NaiveDate, seats: i32) -> Result<i32, InventoryError> {
        self.seat_update(
            "/api/flights/seats/increment",
            &SeatUpdateRequest { flight_id, seats, date },
        )
        .await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, InventoryError> {
    response
        .json()
        .await
        .map_err(|e| InventoryError::Store(StoreError::corrupt(e)))
}

fn unexpected(status: StatusCode) -> InventoryError {
    warn!(%status, "Flight service call failed");
    InventoryError::Store(StoreError::Unavailable(format!(
        "flight service responded with {}",
        status
    )))
}

/// A 409 carries either a short count ("... Available: N") or a missing counter.
fn seat_conflict(message: &str, request: &SeatUpdateRequest) -> InventoryError {
    let available = message
        .rsplit_once("Available: ")
        .and_then(|(_, count)| count.trim().parse::<i32>().ok());
    match available {
        Some(available) => InventoryError::InsufficientInventory {
            requested: request.seats,
            available,
        },
        None => InventoryError::InventoryUnknown(keys::seats(request.flight_id, request.date)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn test_conflict_bodies() {
        let request = SeatUpdateRequest {
            flight_id: 3,
            seats: 4,
            date: date(),
        };
        assert_eq!(
            seat_conflict("Not enough seats available. Requested: 4, Available: 1", &request),
            InventoryError::InsufficientInventory {
                requested: 4,
                available: 1
            }
        );
        assert_eq!(
            seat_conflict("Seat count not found in cache: flight_seats:3:2025-03-14", &request),
            InventoryError::InventoryUnknown("flight_seats:3:2025-03-14".to_string())
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let flights = HttpFlightInventory::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let ctx = CallContext::background();

        let err = flights
            .validate(
                &ctx,
                &FlightValidationRequest {
                    flight_id: 3,
                    seats: 1,
                    date: date(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Store(StoreError::Unavailable(_))));

        let err = flights.decrement_seats(&ctx, 3, date(), 1).await.unwrap_err();
        assert!(matches!(err, InventoryError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_cancelled_caller_never_sends_decrement() {
        let flights = HttpFlightInventory::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let (ctx, handle) = CallContext::background().cancellable();
        handle.cancel();

        let err = flights.decrement_seats(&ctx, 3, date(), 1).await.unwrap_err();
        assert!(matches!(err, InventoryError::Interrupted(_)));
    }
}
