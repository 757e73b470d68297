use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use skyroute_core::models::{
    Flight, FlightValidationRequest, FlightValidationResponse, SearchRequest, SearchResponse,
};
use skyroute_core::repository::{InventoryStore, SearchCacheStore, SeatCounter};
use skyroute_core::CallContext;

use crate::inventory::{InventoryError, SeatInventoryCache};
use crate::pathfinder::{ItineraryPathFinder, DEFAULT_MAX_STOPS};
use crate::search::{SearchError, SearchResultCache};

/// What the booking saga needs from the flight side.
#[async_trait]
pub trait FlightInventory: Send + Sync {
    async fn validate(
        &self,
        ctx: &CallContext,
        request: &FlightValidationRequest,
    ) -> Result<FlightValidationResponse, InventoryError>;

    async fn decrement_seats(
        &self,
        ctx: &CallContext,
        flight_id: i64,
        date: NaiveDate,
        seats: i32,
    ) -> Result<i32, InventoryError>;

    async fn increment_seats(&self, flight_id: i64, date: NaiveDate, seats: i32) -> Result<i32, InventoryError>;
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub seat_cache_ttl: Duration,
    pub search_cache_ttl: Duration,
    pub connection_window: chrono::Duration,
    pub max_stops: usize,
    pub max_results: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            seat_cache_ttl: Duration::from_secs(60 * 60),
            search_cache_ttl: Duration::from_secs(2 * 60 * 60),
            connection_window: chrono::Duration::hours(4),
            max_stops: DEFAULT_MAX_STOPS,
            max_results: 20,
        }
    }
}

pub struct FlightService {
    store: Arc<dyn InventoryStore>,
    inventory: SeatInventoryCache,
    searches: SearchResultCache,
    pathfinder: ItineraryPathFinder,
    max_results: usize,
}

impl FlightService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        seats: Arc<dyn SeatCounter>,
        search_cache: Arc<dyn SearchCacheStore>,
        settings: CatalogSettings,
    ) -> Self {
        let pathfinder = ItineraryPathFinder::new(settings.connection_window, settings.max_stops);
        Self {
            inventory: SeatInventoryCache::new(Arc::clone(&store), seats, settings.seat_cache_ttl),
            searches: SearchResultCache::new(
                Arc::clone(&store),
                search_cache,
                pathfinder,
                settings.search_cache_ttl,
            ),
            store,
            pathfinder,
            max_results: settings.max_results,
        }
    }

    pub fn inventory(&self) -> &SeatInventoryCache {
        &self.inventory
    }

    /// Itineraries with at least `request.seats` live seats on every leg,
    /// ranked and truncated.
    pub async fn search(&self, ctx: &CallContext, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        if request.source.trim().is_empty() || request.destination.trim().is_empty() {
            return Err(SearchError::Invalid("source and destination are required".to_string()));
        }
        if request.seats < 1 {
            return Err(SearchError::Invalid(format!("Invalid seats parameter: {}", request.seats)));
        }

        let candidates = self
            .searches
            .candidates(ctx, &request.source, &request.destination, request.date)
            .await?;

        let live = self.live_availability(ctx, &candidates).await?;
        let mut paths = self.pathfinder.find_paths(
            &candidates,
            &request.source,
            &request.destination,
            request.date,
            |f| live.get(&f.id).is_some_and(|available| *available >= request.seats),
        );

        request.sort_by.sort(&mut paths);
        paths.truncate(self.max_results);

        info!(
            source = %request.source,
            destination = %request.destination,
            date = %request.date,
            count = paths.len(),
            "Flight search completed"
        );
        Ok(SearchResponse {
            count: paths.len(),
            paths,
        })
    }

    /// Live seat count per candidate. A leg whose count cannot be read drops
    /// out of this search.
    async fn live_availability(
        &self,
        ctx: &CallContext,
        candidates: &[Flight],
    ) -> Result<HashMap<i64, i32>, SearchError> {
        let reads = candidates.iter().map(|f| async move {
            (f.id, self.inventory.get_available(ctx, f.id, f.departure_date()).await)
        });

        let mut live = HashMap::with_capacity(candidates.len());
        for (flight_id, read) in join_all(reads).await {
            match read {
                Ok(available) => {
                    live.insert(flight_id, available);
                }
                Err(InventoryError::Interrupted(interrupted)) => return Err(interrupted.into()),
                Err(e) => warn!(flight_id, error = %e, "Failed to get available seats"),
            }
        }
        Ok(live)
    }

    pub async fn get_flight(&self, ctx: &CallContext, flight_id: i64) -> Result<Option<Flight>, InventoryError> {
        Ok(ctx.run(self.store.read_flight(flight_id)).await??)
    }
}

#[async_trait]
impl FlightInventory for FlightService {
    async fn validate(
        &self,
        ctx: &CallContext,
        request: &FlightValidationRequest,
    ) -> Result<FlightValidationResponse, InventoryError> {
        if request.seats < 1 {
            return Err(InventoryError::InvalidSeats(request.seats));
        }

        let Some(flight) = self.get_flight(ctx, request.flight_id).await? else {
            return Ok(FlightValidationResponse::rejected("Flight not found"));
        };
        if flight.departure_date() != request.date {
            return Ok(FlightValidationResponse::rejected(format!(
                "Flight {} does not depart on {}",
                flight.flight_number, request.date
            )));
        }

        let available = self
            .inventory
            .get_available(ctx, request.flight_id, request.date)
            .await?;
        let valid = available >= request.seats;

        Ok(FlightValidationResponse {
            valid,
            message: (!valid).then(|| {
                InventoryError::InsufficientInventory {
                    requested: request.seats,
                    available,
                }
                .to_string()
            }),
            price: Some(flight.price * f64::from(request.seats)),
            available_seats: Some(available),
        })
    }

    async fn decrement_seats(
        &self,
        ctx: &CallContext,
        flight_id: i64,
        date: NaiveDate,
        seats: i32,
    ) -> Result<i32, InventoryError> {
        self.inventory.decrement(ctx, flight_id, date, seats).await
    }

    async fn increment_seats(&self, flight_id: i64, date: NaiveDate, seats: i32) -> Result<i32, InventoryError> {
        self.inventory.increment(flight_id, date, seats).await
    }
}
