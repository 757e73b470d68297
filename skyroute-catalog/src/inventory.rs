use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use skyroute_core::keys;
use skyroute_core::repository::{InventoryStore, SeatCounter, SeatDecrement};
use skyroute_core::{CallContext, Interrupted, StoreError};

/// Available-seat counts per (flight, date) on the fast path, reseeded from
/// the durable store on a miss.
#[derive(Clone)]
pub struct SeatInventoryCache {
    store: Arc<dyn InventoryStore>,
    counter: Arc<dyn SeatCounter>,
    ttl: Duration,
}

impl SeatInventoryCache {
    pub fn new(store: Arc<dyn InventoryStore>, counter: Arc<dyn SeatCounter>, ttl: Duration) -> Self {
        Self { store, counter, ttl }
    }

    /// Current count. On a miss the durable `total - booked` is seeded
    /// put-if-absent, so a concurrent writer's value wins.
    pub async fn get_available(
        &self,
        ctx: &CallContext,
        flight_id: i64,
        date: NaiveDate,
    ) -> Result<i32, InventoryError> {
        let key = keys::seats(flight_id, date);

        if let Some(count) = ctx.run(self.counter.get(&key)).await?? {
            debug!(key = %key, count, "Seat cache hit");
            return Ok(count);
        }

        let durable = ctx.run(self.store.read_available(flight_id, date)).await??;
        let count = ctx.run(self.counter.seed(&key, durable, self.ttl)).await??;
        debug!(key = %key, durable, count, "Seat cache seeded");
        Ok(count)
    }

    /// Atomic check-and-subtract.
    ///
    /// The caller's context is checked before the call is issued but never
    /// interrupts it: an abandoned decrement would leave its effect unknown.
    pub async fn decrement(
        &self,
        ctx: &CallContext,
        flight_id: i64,
        date: NaiveDate,
        seats: i32,
    ) -> Result<i32, InventoryError> {
        ensure_positive(seats)?;
        ctx.check()?;

        let key = keys::seats(flight_id, date);
        match self.counter.decrement(&key, seats).await? {
            SeatDecrement::Applied(remaining) => {
                info!(flight_id, date = %date, seats, remaining, "Seats decremented");
                Ok(remaining)
            }
            SeatDecrement::Insufficient(available) => Err(InventoryError::InsufficientInventory {
                requested: seats,
                available,
            }),
            SeatDecrement::Missing => Err(InventoryError::InventoryUnknown(key)),
        }
    }

    /// Atomic add. Never creates a missing counter.
    pub async fn increment(&self, flight_id: i64, date: NaiveDate, seats: i32) -> Result<i32, InventoryError> {
        ensure_positive(seats)?;

        let key = keys::seats(flight_id, date);
        match self.counter.increment(&key, seats).await? {
            Some(available) => {
                info!(flight_id, date = %date, seats, available, "Seats incremented");
                Ok(available)
            }
            None => Err(InventoryError::InventoryUnknown(key)),
        }
    }
}

fn ensure_positive(seats: i32) -> Result<(), InventoryError> {
    if seats < 1 {
        return Err(InventoryError::InvalidSeats(seats));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InventoryError {
    #[error("Invalid seat count: {0}")]
    InvalidSeats(i32),

    #[error("Not enough seats available. Requested: {requested}, Available: {available}")]
    InsufficientInventory { requested: i32, available: i32 },

    #[error("Seat count not found in cache: {0}")]
    InventoryUnknown(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use skyroute_core::models::Flight;
    use skyroute_store::{MemoryCache, MemoryInventoryStore};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn setup(total: i32, booked: i32) -> (SeatInventoryCache, Arc<MemoryInventoryStore>) {
        let store = Arc::new(MemoryInventoryStore::with_flights([Flight {
            id: 1,
            flight_number: "6E201".to_string(),
            source: "DEL".to_string(),
            destination: "BOM".to_string(),
            departure_time: Utc.with_ymd_and_hms(2025, 3, 14, 6, 0, 0).unwrap(),
            arrival_time: Utc.with_ymd_and_hms(2025, 3, 14, 8, 10, 0).unwrap(),
            total_seats: total,
            booked_seats: booked,
            price: 4500.0,
            created_at: Utc::now(),
        }]));
        let inventory = SeatInventoryCache::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(3600),
        );
        (inventory, store)
    }

    #[tokio::test]
    async fn test_miss_seeds_from_durable_store() {
        let (inventory, store) = setup(180, 30);
        let ctx = CallContext::background();

        assert_eq!(inventory.get_available(&ctx, 1, date()).await.unwrap(), 150);

        // The cache is authoritative once populated.
        store.set_unavailable(true);
        assert_eq!(inventory.get_available(&ctx, 1, date()).await.unwrap(), 150);
    }

    #[tokio::test]
    async fn test_decrement_requires_seeded_counter() {
        let (inventory, _) = setup(10, 0);
        let ctx = CallContext::background();

        let err = inventory.decrement(&ctx, 1, date(), 1).await.unwrap_err();
        assert!(matches!(err, InventoryError::InventoryUnknown(_)));

        inventory.get_available(&ctx, 1, date()).await.unwrap();
        assert_eq!(inventory.decrement(&ctx, 1, date(), 4).await.unwrap(), 6);

        let err = inventory.decrement(&ctx, 1, date(), 7).await.unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientInventory {
                requested: 7,
                available: 6
            }
        );
        assert_eq!(
            err.to_string(),
            "Not enough seats available. Requested: 7, Available: 6"
        );
    }

    #[tokio::test]
    async fn test_increment_never_creates_counter() {
        let (inventory, _) = setup(10, 0);
        let err = inventory.increment(1, date(), 2).await.unwrap_err();
        assert!(matches!(err, InventoryError::InventoryUnknown(_)));

        let ctx = CallContext::background();
        assert_eq!(inventory.get_available(&ctx, 1, date()).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_seats() {
        let (inventory, _) = setup(10, 0);
        let ctx = CallContext::background();
        assert_eq!(
            inventory.decrement(&ctx, 1, date(), 0).await.unwrap_err(),
            InventoryError::InvalidSeats(0)
        );
        assert_eq!(
            inventory.increment(1, date(), -2).await.unwrap_err(),
            InventoryError::InvalidSeats(-2)
        );
    }

    #[tokio::test]
    async fn test_cancelled_caller_never_issues_decrement() {
        let (inventory, _) = setup(10, 0);
        let ctx = CallContext::background();
        inventory.get_available(&ctx, 1, date()).await.unwrap();

        let (cancelled, handle) = CallContext::background().cancellable();
        handle.cancel();
        let err = inventory.decrement(&cancelled, 1, date(), 1).await.unwrap_err();
        assert_eq!(err, InventoryError::Interrupted(Interrupted::Cancelled));
        assert_eq!(inventory.get_available(&ctx, 1, date()).await.unwrap(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_last_seat_sold_once() {
        let (inventory, _) = setup(10, 9);
        let ctx = CallContext::background();
        inventory.get_available(&ctx, 1, date()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let inventory = inventory.clone();
            handles.push(tokio::spawn(async move {
                inventory.decrement(&CallContext::background(), 1, date(), 1).await
            }));
        }

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(InventoryError::InsufficientInventory { available: 0, .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(sold, 1);
        assert_eq!(inventory.get_available(&ctx, 1, date()).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_decrement_racing_compensation_converges() {
        let (inventory, _) = setup(50, 0);
        let ctx = CallContext::background();
        inventory.get_available(&ctx, 1, date()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let inventory = inventory.clone();
            handles.push(tokio::spawn(async move {
                let ctx = CallContext::background();
                inventory.decrement(&ctx, 1, date(), 2).await.unwrap();
                tokio::task::yield_now().await;
                inventory.increment(1, date(), 2).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(inventory.get_available(&ctx, 1, date()).await.unwrap(), 50);
    }
}
