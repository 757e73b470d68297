use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

use crate::models::{Booking, BookingStatus, Flight, HoldState, NewBooking, TempBooking};
use crate::StoreResult;

/// Authoritative flight and booking records.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// `total - booked` for a flight departing on `date`.
    async fn read_available(&self, flight_id: i64, date: NaiveDate) -> StoreResult<i32>;

    async fn read_flight(&self, flight_id: i64) -> StoreResult<Option<Flight>>;

    /// Every flight departing on `date`, in departure order.
    async fn flights_on(&self, date: NaiveDate) -> StoreResult<Vec<Flight>>;

    /// Persist a booking. A `confirmed` booking also adds its seats to the
    /// flight's booked count, failing with `Conflict` past capacity.
    async fn create_booking(&self, booking: &NewBooking) -> StoreResult<i64>;

    async fn read_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>>;

    /// Compare-and-set on the booking's lifecycle. Fails with `Conflict` when
    /// the current status cannot move to `status`. Moving to `cancelled`
    /// releases the booking's seats from the flight's booked count.
    async fn update_booking_status(&self, booking_id: i64, status: BookingStatus) -> StoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatDecrement {
    /// Seats taken; carries the remaining count.
    Applied(i32),
    /// Not enough seats; carries the untouched current count.
    Insufficient(i32),
    /// No counter for the key.
    Missing,
}

/// Fast-path seat counters. Every mutation is one indivisible step.
#[async_trait]
pub trait SeatCounter: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<i32>>;

    /// Put-if-absent. Returns whatever value the key holds afterwards.
    async fn seed(&self, key: &str, count: i32, ttl: Duration) -> StoreResult<i32>;

    /// Check `current >= seats` and subtract, atomically.
    async fn decrement(&self, key: &str, seats: i32) -> StoreResult<SeatDecrement>;

    /// Add seats back. `None` when the key does not exist; never creates it.
    async fn increment(&self, key: &str, seats: i32) -> StoreResult<Option<i32>>;
}

#[async_trait]
pub trait SearchCacheStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<Flight>>>;

    async fn put(&self, key: &str, flights: &[Flight], ttl: Duration) -> StoreResult<()>;
}

#[async_trait]
pub trait TempBookingStore: Send + Sync {
    /// Put-if-absent. `false` when a staging record already holds the key.
    async fn stage(&self, key: &str, booking: &TempBooking, ttl: Duration) -> StoreResult<bool>;

    async fn get(&self, key: &str) -> StoreResult<Option<TempBooking>>;

    /// Compare-and-set on the record's hold state, keeping its expiry.
    /// Returns the updated record, or `None` when the key is absent or its
    /// state is not `from`. Exactly one of several racing callers wins.
    async fn transition(&self, key: &str, from: HoldState, to: HoldState) -> StoreResult<Option<TempBooking>>;

    async fn discard(&self, key: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait BookingCache: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Booking>>;

    async fn put(&self, key: &str, booking: &Booking, ttl: Duration) -> StoreResult<()>;

    async fn evict(&self, key: &str) -> StoreResult<()>;
}
