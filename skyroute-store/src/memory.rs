//! Process-local implementations of every storage boundary.
//!
//! Used by tests and by `storage.backend = "memory"`. Per-key atomicity comes
//! from holding the dashmap shard lock for the whole check-and-mutate step.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use skyroute_core::models::{Booking, BookingStatus, Flight, HoldState, NewBooking, TempBooking};
use skyroute_core::repository::{
    BookingCache, InventoryStore, SearchCacheStore, SeatCounter, SeatDecrement, TempBookingStore,
};
use skyroute_core::{StoreError, StoreResult};

// ============================================================================
// Durable store
// ============================================================================

#[derive(Default)]
pub struct MemoryInventoryStore {
    flights: DashMap<i64, Flight>,
    bookings: DashMap<i64, Booking>,
    next_booking_id: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flights(flights: impl IntoIterator<Item = Flight>) -> Self {
        let store = Self::new();
        for flight in flights {
            store.insert_flight(flight);
        }
        store
    }

    pub fn insert_flight(&self, flight: Flight) {
        self.flights.insert(flight.id, flight);
    }

    pub fn flight(&self, flight_id: i64) -> Option<Flight> {
        self.flights.get(&flight_id).map(|f| f.clone())
    }

    /// Simulate an outage: every call fails with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("inventory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn read_available(&self, flight_id: i64, date: NaiveDate) -> StoreResult<i32> {
        self.ensure_available()?;
        self.flights
            .get(&flight_id)
            .filter(|f| f.departure_date() == date)
            .map(|f| f.available_seats())
            .ok_or_else(|| StoreError::NotFound(format!("flight {} on {}", flight_id, date)))
    }

    async fn read_flight(&self, flight_id: i64) -> StoreResult<Option<Flight>> {
        self.ensure_available()?;
        Ok(self.flight(flight_id))
    }

    async fn flights_on(&self, date: NaiveDate) -> StoreResult<Vec<Flight>> {
        self.ensure_available()?;
        let mut flights: Vec<Flight> = self
            .flights
            .iter()
            .filter(|f| f.departure_date() == date)
            .map(|f| f.clone())
            .collect();
        flights.sort_by_key(|f| (f.departure_time, f.id));
        Ok(flights)
    }

    async fn create_booking(&self, booking: &NewBooking) -> StoreResult<i64> {
        self.ensure_available()?;

        if booking.status == BookingStatus::Confirmed {
            let mut flight = self
                .flights
                .get_mut(&booking.flight_id)
                .ok_or_else(|| StoreError::NotFound(format!("flight {}", booking.flight_id)))?;
            if flight.booked_seats + booking.seats > flight.total_seats {
                return Err(StoreError::Conflict(format!(
                    "flight {} cannot take {} more seats",
                    booking.flight_id, booking.seats
                )));
            }
            flight.booked_seats += booking.seats;
        }

        let id = self.next_booking_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.bookings.insert(
            id,
            Booking {
                id,
                user_id: booking.user_id,
                flight_id: booking.flight_id,
                seats: booking.seats,
                total_amount: booking.total_amount,
                status: booking.status,
                payment_id: booking.payment_id.clone(),
                date: booking.date,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn read_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        self.ensure_available()?;
        Ok(self.bookings.get(&booking_id).map(|b| b.clone()))
    }

    async fn update_booking_status(&self, booking_id: i64, status: BookingStatus) -> StoreResult<()> {
        self.ensure_available()?;

        let (previous, flight_id, seats) = {
            let mut booking = self
                .bookings
                .get_mut(&booking_id)
                .ok_or_else(|| StoreError::NotFound(format!("booking {}", booking_id)))?;
            if !booking.status.can_transition_to(status) {
                return Err(StoreError::Conflict(format!(
                    "booking {} cannot move from {} to {}",
                    booking_id, booking.status, status
                )));
            }
            let previous = booking.status;
            booking.status = status;
            (previous, booking.flight_id, booking.seats)
        };

        if previous == BookingStatus::Confirmed && status == BookingStatus::Cancelled {
            if let Some(mut flight) = self.flights.get_mut(&flight_id) {
                flight.booked_seats = (flight.booked_seats - seats).max(0);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Fast path
// ============================================================================

struct Expiring<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Expiring<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Key-value map whose entries vanish after their freshness window.
struct ExpiringMap<V> {
    entries: DashMap<String, Expiring<V>>,
}

impl<V> Default for ExpiringMap<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V: Clone> ExpiringMap<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .and_then(|e| e.is_live(now).then(|| e.value.clone()));
        if live.is_none() {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
        }
        live
    }

    fn insert(&self, key: &str, value: V, ttl: Duration) {
        self.entries.insert(key.to_string(), Expiring::new(value, ttl));
    }

    /// Insert unless a live entry exists; returns the value held afterwards.
    fn insert_if_absent(&self, key: &str, value: V, ttl: Duration) -> (V, bool) {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) if !slot.get().is_live(now) => {
                slot.insert(Expiring::new(value.clone(), ttl));
                (value, true)
            }
            Entry::Occupied(slot) => (slot.get().value.clone(), false),
            Entry::Vacant(slot) => {
                slot.insert(Expiring::new(value.clone(), ttl));
                (value, true)
            }
        }
    }

    /// Run `f` on a live entry under its shard lock.
    fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let now = Instant::now();
        let out = match self.entries.get_mut(key) {
            Some(mut slot) if slot.is_live(now) => Some(f(&mut slot.value)),
            _ => None,
        };
        if out.is_none() {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
        }
        out
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// In-memory counterpart of [`crate::RedisClient`]: seat counters, search
/// cache, staging records and booking cache behind one handle.
#[derive(Default)]
pub struct MemoryCache {
    seats: ExpiringMap<i32>,
    searches: ExpiringMap<Vec<Flight>>,
    temp_bookings: ExpiringMap<TempBooking>,
    bookings: ExpiringMap<Booking>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeatCounter for MemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<i32>> {
        Ok(self.seats.get(key))
    }

    async fn seed(&self, key: &str, count: i32, ttl: Duration) -> StoreResult<i32> {
        Ok(self.seats.insert_if_absent(key, count, ttl).0)
    }

    async fn decrement(&self, key: &str, seats: i32) -> StoreResult<SeatDecrement> {
        let outcome = self.seats.update(key, |current| {
            if *current >= seats {
                *current -= seats;
                SeatDecrement::Applied(*current)
            } else {
                SeatDecrement::Insufficient(*current)
            }
        });
        Ok(outcome.unwrap_or(SeatDecrement::Missing))
    }

    async fn increment(&self, key: &str, seats: i32) -> StoreResult<Option<i32>> {
        Ok(self.seats.update(key, |current| {
            *current += seats;
            *current
        }))
    }
}

#[async_trait]
impl SearchCacheStore for MemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<Flight>>> {
        Ok(self.searches.get(key))
    }

    async fn put(&self, key: &str, flights: &[Flight], ttl: Duration) -> StoreResult<()> {
        self.searches.insert(key, flights.to_vec(), ttl);
        Ok(())
    }
}

#[async_trait]
impl TempBookingStore for MemoryCache {
    async fn stage(&self, key: &str, booking: &TempBooking, ttl: Duration) -> StoreResult<bool> {
        Ok(self.temp_bookings.insert_if_absent(key, booking.clone(), ttl).1)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<TempBooking>> {
        Ok(self.temp_bookings.get(key))
    }

    async fn transition(&self, key: &str, from: HoldState, to: HoldState) -> StoreResult<Option<TempBooking>> {
        let moved = self.temp_bookings.update(key, |temp| {
            (temp.state == from).then(|| {
                temp.state = to;
                temp.clone()
            })
        });
        Ok(moved.flatten())
    }

    async fn discard(&self, key: &str) -> StoreResult<()> {
        self.temp_bookings.remove(key);
        Ok(())
    }
}

#[async_trait]
impl BookingCache for MemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.get(key))
    }

    async fn put(&self, key: &str, booking: &Booking, ttl: Duration) -> StoreResult<()> {
        self.bookings.insert(key, booking.clone(), ttl);
        Ok(())
    }

    async fn evict(&self, key: &str) -> StoreResult<()> {
        self.bookings.remove(key);
        Ok(())
    }
}
