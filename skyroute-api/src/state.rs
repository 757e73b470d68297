use std::sync::Arc;

use skyroute_catalog::{CatalogSettings, FlightInventory, FlightService};
use skyroute_core::payment::PaymentGateway;
use skyroute_core::repository::{BookingCache, InventoryStore, SearchCacheStore, SeatCounter, TempBookingStore};
use skyroute_order::{BookingOrchestrator, BookingSettings, SimulatedPaymentGateway};
use skyroute_store::app_config::BusinessRules;

#[derive(Clone)]
pub struct AppState {
    pub flights: Arc<FlightService>,
    pub bookings: Arc<BookingOrchestrator>,
    pub payments: Arc<dyn PaymentGateway>,
    /// Backs the forced-outcome payment endpoints, whatever `payments` is.
    pub simulator: SimulatedPaymentGateway,
}

/// Backends the services are wired onto. Redis implements every cache trait,
/// as does the in-memory cache, so one value usually fills all four slots.
pub struct Backends {
    pub store: Arc<dyn InventoryStore>,
    pub seats: Arc<dyn SeatCounter>,
    pub search_cache: Arc<dyn SearchCacheStore>,
    pub temp_bookings: Arc<dyn TempBookingStore>,
    pub booking_cache: Arc<dyn BookingCache>,
}

impl AppState {
    pub fn new(backends: Backends, payments: Arc<dyn PaymentGateway>, rules: &BusinessRules) -> Self {
        Self::build(backends, payments, None, rules)
    }

    /// Same wiring, but the booking saga validates and reserves seats
    /// through `remote` instead of this process's flight service.
    pub fn with_remote_flights(
        backends: Backends,
        payments: Arc<dyn PaymentGateway>,
        remote: Arc<dyn FlightInventory>,
        rules: &BusinessRules,
    ) -> Self {
        Self::build(backends, payments, Some(remote), rules)
    }

    fn build(
        backends: Backends,
        payments: Arc<dyn PaymentGateway>,
        remote: Option<Arc<dyn FlightInventory>>,
        rules: &BusinessRules,
    ) -> Self {
        let catalog = CatalogSettings {
            seat_cache_ttl: rules.seat_cache_ttl(),
            search_cache_ttl: rules.search_cache_ttl(),
            connection_window: rules.connection_window(),
            max_stops: rules.max_stops,
            max_results: rules.max_results,
        };
        let booking = BookingSettings {
            temp_booking_ttl: rules.temp_booking_ttl(),
            booking_cache_ttl: rules.booking_cache_ttl(),
        };

        let flights = Arc::new(FlightService::new(
            Arc::clone(&backends.store),
            backends.seats,
            backends.search_cache,
            catalog,
        ));
        let saga_flights = remote.unwrap_or_else(|| Arc::clone(&flights) as Arc<dyn FlightInventory>);
        let bookings = Arc::new(BookingOrchestrator::new(
            saga_flights,
            Arc::clone(&payments),
            backends.store,
            backends.temp_bookings,
            backends.booking_cache,
            booking,
        ));

        Self {
            flights,
            bookings,
            payments,
            simulator: SimulatedPaymentGateway::default(),
        }
    }

    pub fn with_simulator(mut self, simulator: SimulatedPaymentGateway) -> Self {
        self.simulator = simulator;
        self
    }
}
