use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use skyroute_core::keys;
use skyroute_core::models::Flight;
use skyroute_core::repository::{InventoryStore, SearchCacheStore};
use skyroute_core::{CallContext, Interrupted, StoreError};

use crate::pathfinder::ItineraryPathFinder;
use crate::singleflight::SingleFlight;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid search: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Unfiltered candidate flights per (source, destination, date).
///
/// Misses are coalesced: concurrent callers for one key share a single
/// recomputation, which also writes the cache before it leaves the registry.
pub struct SearchResultCache {
    store: Arc<dyn InventoryStore>,
    cache: Arc<dyn SearchCacheStore>,
    pathfinder: ItineraryPathFinder,
    ttl: Duration,
    in_flight: SingleFlight<String, Arc<Vec<Flight>>, SearchError>,
}

impl SearchResultCache {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        cache: Arc<dyn SearchCacheStore>,
        pathfinder: ItineraryPathFinder,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            pathfinder,
            ttl,
            in_flight: SingleFlight::new(),
        }
    }

    pub async fn candidates(
        &self,
        ctx: &CallContext,
        source: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Arc<Vec<Flight>>, SearchError> {
        let key = keys::search(source, destination, date);

        if let Some(flights) = read_cache(self.cache.as_ref(), &key).await {
            debug!(key = %key, count = flights.len(), "Search cache hit");
            return Ok(Arc::new(flights));
        }

        let compute = recompute(
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            self.pathfinder,
            self.ttl,
            key.clone(),
            source.to_string(),
            destination.to_string(),
            date,
        );

        // The shared computation outlives this caller's deadline.
        let (result, joined) = ctx.run(self.in_flight.run(key.clone(), compute)).await?;
        if joined {
            debug!(key = %key, "Joined in-flight search");
        }
        result
    }
}

async fn read_cache(cache: &dyn SearchCacheStore, key: &str) -> Option<Vec<Flight>> {
    match cache.get(key).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(key, error = %e, "Search cache read failed, treating as miss");
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn recompute(
    store: Arc<dyn InventoryStore>,
    cache: Arc<dyn SearchCacheStore>,
    pathfinder: ItineraryPathFinder,
    ttl: Duration,
    key: String,
    source: String,
    destination: String,
    date: NaiveDate,
) -> Result<Arc<Vec<Flight>>, SearchError> {
    // A computation that finished between our cache read and registration
    // has already written the entry.
    if let Some(flights) = read_cache(cache.as_ref(), &key).await {
        return Ok(Arc::new(flights));
    }

    let day = store.flights_on(date).await?;
    let paths = pathfinder.find_paths(&day, &source, &destination, date, |f| f.can_book(1));

    let mut legs: BTreeMap<i64, Flight> = BTreeMap::new();
    for path in paths {
        for flight in path.flights {
            legs.entry(flight.id).or_insert(flight);
        }
    }
    let flights: Vec<Flight> = legs.into_values().collect();

    if let Err(e) = cache.put(&key, &flights, ttl).await {
        warn!(key = %key, error = %e, "Failed to cache search results");
    }
    debug!(key = %key, count = flights.len(), "Search candidates computed");

    Ok(Arc::new(flights))
}
