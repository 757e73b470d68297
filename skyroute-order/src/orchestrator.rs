use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use skyroute_catalog::{FlightInventory, InventoryError};
use skyroute_core::keys;
use skyroute_core::models::{
    Booking, BookingRequest, BookingResponse, BookingStatus, FlightValidationRequest, HoldState,
    NewBooking, TempBooking,
};
use skyroute_core::payment::{PaymentGateway, PaymentRequest, PaymentStatus, PaymentType};
use skyroute_core::repository::{BookingCache, InventoryStore, TempBookingStore};
use skyroute_core::{CallContext, Interrupted, StoreError};

use crate::saga::{BookingSaga, Compensation, InvalidTransition, SagaState};

const CONFIRMED_MESSAGE: &str = "Booking created successfully";
const PENDING_MESSAGE: &str = "Payment pending, please retry";
const IN_PROGRESS_MESSAGE: &str = "booking already in progress";

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub temp_booking_ttl: Duration,
    pub booking_cache_ttl: Duration,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            temp_booking_ttl: Duration::from_secs(15 * 60),
            booking_cache_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// How a `Pending` saga was settled out of band.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentResolution {
    /// The charge went through; record the booking.
    Settled { payment_id: String },
    /// Nothing was charged; release the reservation.
    NotCharged,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileRequest {
    pub user_id: i64,
    pub flight_id: i64,
    #[serde(flatten)]
    pub resolution: PaymentResolution,
}

/// Seats held by one saga, from staging until its terminal state.
#[derive(Debug, Clone)]
struct Reservation {
    user_id: i64,
    flight_id: i64,
    seats: i32,
    date: NaiveDate,
    amount: f64,
}

impl From<&TempBooking> for Reservation {
    fn from(temp: &TempBooking) -> Self {
        Self {
            user_id: temp.user_id,
            flight_id: temp.flight_id,
            seats: temp.seats,
            date: temp.date,
            amount: temp.total_amount,
        }
    }
}

/// Drives validate -> reserve -> pay -> confirm, compensating on failure.
///
/// Only this type ever pairs a seat decrement with its compensating
/// increment.
pub struct BookingOrchestrator {
    flights: Arc<dyn FlightInventory>,
    payments: Arc<dyn PaymentGateway>,
    store: Arc<dyn InventoryStore>,
    temp_bookings: Arc<dyn TempBookingStore>,
    booking_cache: Arc<dyn BookingCache>,
    settings: BookingSettings,
}

impl BookingOrchestrator {
    pub fn new(
        flights: Arc<dyn FlightInventory>,
        payments: Arc<dyn PaymentGateway>,
        store: Arc<dyn InventoryStore>,
        temp_bookings: Arc<dyn TempBookingStore>,
        booking_cache: Arc<dyn BookingCache>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            flights,
            payments,
            store,
            temp_bookings,
            booking_cache,
            settings,
        }
    }

    pub async fn create_booking(
        &self,
        ctx: &CallContext,
        request: &BookingRequest,
    ) -> Result<BookingResponse, BookingError> {
        validate_request(request)?;
        let payment_type = request
            .payment_type
            .clone()
            .unwrap_or_else(|| PaymentType::DEFAULT.to_string());

        info!(
            user_id = request.user_id,
            flight_id = request.flight_id,
            seats = request.seats,
            "Creating booking"
        );

        let mut saga = BookingSaga::new();

        // Validating
        let validation = self
            .flights
            .validate(
                ctx,
                &FlightValidationRequest {
                    flight_id: request.flight_id,
                    seats: request.seats,
                    date: request.date,
                },
            )
            .await?;
        if !validation.valid {
            saga.advance(SagaState::Failed)?;
            return Ok(failed(0.0, validation.message.unwrap_or_default()));
        }

        let reservation = Reservation {
            user_id: request.user_id,
            flight_id: request.flight_id,
            seats: request.seats,
            date: request.date,
            amount: validation.price.unwrap_or_default(),
        };

        // Reserving
        saga.advance(SagaState::Reserving)?;
        ctx.check()?;

        let temp_key = keys::temp_booking(reservation.user_id, reservation.flight_id);
        let temp = TempBooking::new(
            reservation.user_id,
            reservation.flight_id,
            reservation.seats,
            reservation.amount,
            reservation.date,
            chrono::Duration::from_std(self.settings.temp_booking_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(15)),
        );
        let staged = self
            .temp_bookings
            .stage(&temp_key, &temp, self.settings.temp_booking_ttl)
            .await?;
        if !staged {
            saga.advance(SagaState::Failed)?;
            warn!(key = %temp_key, "Rejected booking: another saga holds the staging record");
            return Ok(failed(reservation.amount, IN_PROGRESS_MESSAGE));
        }
        saga.record(Compensation::DiscardTempBooking {
            user_id: reservation.user_id,
            flight_id: reservation.flight_id,
        });

        if let Err(interrupted) = ctx.check() {
            self.compensate(&mut saga).await;
            return Err(interrupted.into());
        }

        match self
            .flights
            .decrement_seats(ctx, reservation.flight_id, reservation.date, reservation.seats)
            .await
        {
            Ok(_) => saga.record(Compensation::ReleaseSeats {
                flight_id: reservation.flight_id,
                date: reservation.date,
                seats: reservation.seats,
            }),
            Err(e @ (InventoryError::InsufficientInventory { .. } | InventoryError::InventoryUnknown(_))) => {
                self.compensate(&mut saga).await;
                saga.advance(SagaState::Failed)?;
                return Ok(failed(reservation.amount, format!("Failed to reserve seats: {}", e)));
            }
            Err(InventoryError::Store(e)) => {
                // The reply may have been lost after the decrement ran; keep the hold.
                warn!(
                    user_id = reservation.user_id,
                    flight_id = reservation.flight_id,
                    error = %e,
                    "Seat reservation outcome unknown"
                );
                return self.park(&mut saga, &reservation).await;
            }
            Err(e) => {
                self.compensate(&mut saga).await;
                return Err(e.into());
            }
        }

        // AwaitingPayment
        saga.advance(SagaState::AwaitingPayment)?;
        let payment = PaymentRequest {
            // No durable id exists before payment; the user stands in.
            booking_id: reservation.user_id,
            amount: reservation.amount,
            user_id: reservation.user_id,
            payment_type,
        };

        let outcome = match ctx.run(self.payments.process(&payment)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(user_id = reservation.user_id, error = %e, "Payment outcome unknown");
                return self.park(&mut saga, &reservation).await;
            }
            Err(interrupted) => {
                warn!(user_id = reservation.user_id, reason = %interrupted, "Caller left during payment");
                return self.park(&mut saga, &reservation).await;
            }
        };

        match outcome.status {
            PaymentStatus::Success => match outcome.payment_id.filter(|id| !id.is_empty()) {
                Some(payment_id) => self.finalize_paid(&mut saga, &reservation, payment_id).await,
                None => {
                    warn!(user_id = reservation.user_id, "Payment succeeded without an id");
                    self.park(&mut saga, &reservation).await
                }
            },
            PaymentStatus::Failed | PaymentStatus::Timeout => {
                self.compensate(&mut saga).await;
                saga.advance(SagaState::Failed)?;
                info!(
                    user_id = reservation.user_id,
                    flight_id = reservation.flight_id,
                    status = ?outcome.status,
                    "Booking failed at payment"
                );
                Ok(failed(reservation.amount, outcome.message))
            }
            PaymentStatus::Pending => self.park(&mut saga, &reservation).await,
        }
    }

    /// Read-through: booking cache first, then the durable store.
    pub async fn get_booking(&self, ctx: &CallContext, booking_id: i64) -> Result<Booking, BookingError> {
        let key = keys::booking(booking_id);

        match ctx.run(self.booking_cache.get(&key)).await? {
            Ok(Some(booking)) => {
                debug!(booking_id, "Booking cache hit");
                return Ok(booking);
            }
            Ok(None) => {}
            Err(e) => warn!(booking_id, error = %e, "Booking cache read failed"),
        }

        let booking = ctx
            .run(self.store.read_booking(booking_id))
            .await??
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;

        if let Err(e) = self
            .booking_cache
            .put(&key, &booking, self.settings.booking_cache_ttl)
            .await
        {
            warn!(booking_id, error = %e, "Failed to cache booking");
        }
        Ok(booking)
    }

    /// Cancel a `pending` or `confirmed` booking and hand its seats back.
    pub async fn cancel_booking(&self, ctx: &CallContext, booking_id: i64) -> Result<Booking, BookingError> {
        // Always the durable record: a stale cached status must not allow a second cancel.
        let booking = ctx
            .run(self.store.read_booking(booking_id))
            .await??
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;

        if !booking.can_cancel() {
            return Err(BookingError::CannotCancel { status: booking.status });
        }

        ctx.check()?;
        match self
            .store
            .update_booking_status(booking_id, BookingStatus::Cancelled)
            .await
        {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                let status = match self.store.read_booking(booking_id).await {
                    Ok(Some(current)) => current.status,
                    _ => BookingStatus::Cancelled,
                };
                return Err(BookingError::CannotCancel { status });
            }
            Err(e) => return Err(e.into()),
        }

        self.release_seats(booking.flight_id, booking.date, booking.seats).await;

        if let Err(e) = self.booking_cache.evict(&keys::booking(booking_id)).await {
            warn!(booking_id, error = %e, "Failed to evict cancelled booking from cache");
        }

        info!(booking_id, flight_id = booking.flight_id, seats = booking.seats, "Booking cancelled");
        Ok(Booking {
            status: BookingStatus::Cancelled,
            ..booking
        })
    }

    /// Settle a saga left `Pending` once the payment's fate is known.
    ///
    /// Only a parked hold can be settled, and only by one caller: the claim
    /// moves it `parked -> resolving` before anything else is touched.
    pub async fn reconcile_pending(
        &self,
        ctx: &CallContext,
        user_id: i64,
        flight_id: i64,
        resolution: PaymentResolution,
    ) -> Result<BookingResponse, BookingError> {
        if let PaymentResolution::Settled { payment_id } = &resolution {
            if payment_id.trim().is_empty() {
                return Err(BookingError::Validation("payment_id is required".to_string()));
            }
        }

        let key = keys::temp_booking(user_id, flight_id);
        // Checked before the claim, never during it: a claim abandoned mid-call
        // could land and strand the hold in `resolving`.
        ctx.check()?;
        let claimed = self
            .temp_bookings
            .transition(&key, HoldState::Parked, HoldState::Resolving)
            .await?;
        let temp = match claimed {
            Some(temp) => temp,
            None => {
                let current = self.temp_bookings.get(&key).await?;
                return Err(match current {
                    Some(held) => BookingError::NotReconcilable { state: held.state },
                    None => BookingError::NotFound(format!(
                        "pending booking for user {} on flight {}",
                        user_id, flight_id
                    )),
                });
            }
        };

        let reservation = Reservation::from(&temp);
        let mut saga = BookingSaga::resume_pending(&temp);

        match resolution {
            PaymentResolution::Settled { payment_id } => {
                self.finalize_paid(&mut saga, &reservation, payment_id).await
            }
            PaymentResolution::NotCharged => {
                self.compensate(&mut saga).await;
                saga.advance(SagaState::Failed)?;
                info!(user_id, flight_id, "Pending booking released");
                Ok(failed(reservation.amount, "Payment not charged; reservation released"))
            }
        }
    }

    /// Payment captured: record the booking. Ignores the caller's deadline,
    /// since the money has already moved. Dropping the future still stops it,
    /// so callers that can vanish mid-request drive the saga on its own task.
    async fn finalize_paid(
        &self,
        saga: &mut BookingSaga,
        reservation: &Reservation,
        payment_id: String,
    ) -> Result<BookingResponse, BookingError> {
        let new_booking = NewBooking {
            user_id: reservation.user_id,
            flight_id: reservation.flight_id,
            seats: reservation.seats,
            total_amount: reservation.amount,
            status: BookingStatus::Confirmed,
            payment_id: Some(payment_id.clone()),
            date: reservation.date,
        };

        let booking_id = match self.store.create_booking(&new_booking).await {
            Ok(id) => id,
            Err(e) => {
                error!(
                    user_id = reservation.user_id,
                    flight_id = reservation.flight_id,
                    payment_id = %payment_id,
                    error = %e,
                    "Payment captured but booking not recorded"
                );
                self.compensate(saga).await;
                saga.advance(SagaState::Failed)?;
                return Err(BookingError::PaidButUnrecorded {
                    payment_id,
                    reason: e.to_string(),
                });
            }
        };

        saga.advance(SagaState::Confirmed)?;
        saga.commit();

        let temp_key = keys::temp_booking(reservation.user_id, reservation.flight_id);
        if let Err(e) = self.temp_bookings.discard(&temp_key).await {
            warn!(key = %temp_key, error = %e, "Failed to discard staging record");
        }

        let booking = Booking {
            id: booking_id,
            user_id: new_booking.user_id,
            flight_id: new_booking.flight_id,
            seats: new_booking.seats,
            total_amount: new_booking.total_amount,
            status: BookingStatus::Confirmed,
            payment_id: new_booking.payment_id,
            date: new_booking.date,
            created_at: chrono::Utc::now(),
        };
        if let Err(e) = self
            .booking_cache
            .put(&keys::booking(booking_id), &booking, self.settings.booking_cache_ttl)
            .await
        {
            warn!(booking_id, error = %e, "Failed to cache booking");
        }

        info!(booking_id, user_id = booking.user_id, flight_id = booking.flight_id, "Booking confirmed");
        Ok(BookingResponse {
            booking_id: Some(booking_id),
            status: BookingStatus::Confirmed,
            total_amount: reservation.amount,
            payment_id: Some(payment_id),
            message: Some(CONFIRMED_MESSAGE.to_string()),
        })
    }

    /// Outcome unknown: keep the reservation and staging record, and mark the
    /// record parked so reconciliation may claim it.
    async fn park(&self, saga: &mut BookingSaga, reservation: &Reservation) -> Result<BookingResponse, BookingError> {
        saga.advance(SagaState::Pending)?;

        let key = keys::temp_booking(reservation.user_id, reservation.flight_id);
        match self
            .temp_bookings
            .transition(&key, HoldState::Active, HoldState::Parked)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => warn!(key = %key, "Staging record gone before it could be parked"),
            // Unparked holds cannot be reconciled; the record's expiry is all that frees them.
            Err(e) => error!(key = %key, error = %e, "Failed to park staging record"),
        }

        warn!(
            user_id = reservation.user_id,
            flight_id = reservation.flight_id,
            seats = reservation.seats,
            "Booking pending: payment outcome unknown"
        );
        Ok(BookingResponse {
            booking_id: None,
            status: BookingStatus::Pending,
            total_amount: reservation.amount,
            payment_id: None,
            message: Some(PENDING_MESSAGE.to_string()),
        })
    }

    /// Run owed compensations newest-first. Failures are logged, never returned.
    async fn compensate(&self, saga: &mut BookingSaga) {
        for step in saga.take_compensations() {
            match step {
                Compensation::ReleaseSeats { flight_id, date, seats } => {
                    self.release_seats(flight_id, date, seats).await;
                }
                Compensation::DiscardTempBooking { user_id, flight_id } => {
                    let key = keys::temp_booking(user_id, flight_id);
                    if let Err(e) = self.temp_bookings.discard(&key).await {
                        error!(user_id, flight_id, error = %e, "Compensation failed: staging record not discarded");
                    }
                }
            }
        }
    }

    async fn release_seats(&self, flight_id: i64, date: NaiveDate, seats: i32) {
        match self.flights.increment_seats(flight_id, date, seats).await {
            Ok(_) => {}
            // The next read reseeds from the durable count, which never included this hold.
            Err(InventoryError::InventoryUnknown(key)) => {
                warn!(key = %key, seats, "Seat counter gone; release left to reseed");
            }
            Err(e) => {
                error!(flight_id, date = %date, seats, error = %e, "Compensation failed: seats not released");
            }
        }
    }
}

fn validate_request(request: &BookingRequest) -> Result<(), BookingError> {
    if request.user_id <= 0 || request.flight_id <= 0 || request.seats <= 0 {
        return Err(BookingError::Validation(
            "Invalid user ID, flight ID, seats, or date".to_string(),
        ));
    }
    if let Some(payment_type) = &request.payment_type {
        payment_type
            .parse::<PaymentType>()
            .map_err(|_| BookingError::Validation("Invalid payment type".to_string()))?;
    }
    Ok(())
}

fn failed(total_amount: f64, message: impl Into<String>) -> BookingResponse {
    BookingResponse {
        booking_id: None,
        status: BookingStatus::Failed,
        total_amount,
        payment_id: None,
        message: Some(message.into()),
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid booking request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Booking cannot be cancelled in current status: {status}")]
    CannotCancel { status: BookingStatus },

    #[error("Reservation is not awaiting reconciliation: {state:?}")]
    NotReconcilable { state: HoldState },

    #[error("Downstream unavailable: {0}")]
    DownstreamUnavailable(String),

    #[error("Payment {payment_id} captured but booking not recorded: {reason}")]
    PaidButUnrecorded { payment_id: String, reason: String },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => BookingError::NotFound(what),
            StoreError::Unavailable(reason) => BookingError::DownstreamUnavailable(reason),
            other => BookingError::Store(other),
        }
    }
}

impl From<InventoryError> for BookingError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InvalidSeats(_) | InventoryError::InsufficientInventory { .. } => {
                BookingError::Validation(err.to_string())
            }
            InventoryError::InventoryUnknown(key) => {
                BookingError::DownstreamUnavailable(format!("no seat counter for {}", key))
            }
            InventoryError::Store(e) => e.into(),
            InventoryError::Interrupted(i) => i.into(),
        }
    }
}
