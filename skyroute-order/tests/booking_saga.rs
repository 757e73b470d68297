use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use skyroute_catalog::{CatalogSettings, FlightInventory, FlightService, InventoryError};
use skyroute_core::keys;
use skyroute_core::models::{
    BookingRequest, BookingStatus, Flight, FlightValidationRequest, FlightValidationResponse, HoldState,
    TempBooking,
};
use skyroute_core::payment::{PaymentError, PaymentGateway, PaymentOutcome, PaymentRequest, PaymentStatus};
use skyroute_core::repository::{InventoryStore, TempBookingStore};
use skyroute_core::{CallContext, Interrupted, StoreError};
use skyroute_order::{
    BookingError, BookingOrchestrator, BookingSettings, PaymentResolution, SimulatedPaymentGateway,
};
use skyroute_store::{MemoryCache, MemoryInventoryStore};

const FLIGHT: i64 = 1;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
}

fn flight(total: i32) -> Flight {
    Flight {
        id: FLIGHT,
        flight_number: "AI865".to_string(),
        source: "DEL".to_string(),
        destination: "BOM".to_string(),
        departure_time: Utc.with_ymd_and_hms(2025, 3, 14, 6, 0, 0).unwrap(),
        arrival_time: Utc.with_ymd_and_hms(2025, 3, 14, 8, 10, 0).unwrap(),
        total_seats: total,
        booked_seats: 0,
        price: 4500.0,
        created_at: Utc::now(),
    }
}

fn request(user_id: i64, seats: i32) -> BookingRequest {
    BookingRequest {
        user_id,
        flight_id: FLIGHT,
        seats,
        date: date(),
        payment_type: None,
    }
}

enum Step {
    Outcome(PaymentStatus, &'static str),
    Unavailable,
}

/// Replays a fixed list of payment outcomes, optionally slowly.
struct ScriptedGateway {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    delay: Duration,
    on_call: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ScriptedGateway {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            on_call: None,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn on_call(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentOutcome, PaymentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(hook) = &self.on_call {
            hook();
        }
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Outcome(status, message)) => Ok(PaymentOutcome {
                payment_id: (status == PaymentStatus::Success).then(|| format!("pay-{}", n)),
                status,
                message: message.to_string(),
                booking_id: request.booking_id,
                amount: request.amount,
                processed_at: Utc::now(),
            }),
            Some(Step::Unavailable) | None => Err(PaymentError::Unavailable("connection refused".to_string())),
        }
    }
}

/// Claims every flight is bookable so the decrement is the first real check.
struct OptimisticInventory(Arc<FlightService>);

#[async_trait]
impl FlightInventory for OptimisticInventory {
    async fn validate(
        &self,
        _ctx: &CallContext,
        request: &FlightValidationRequest,
    ) -> Result<FlightValidationResponse, InventoryError> {
        Ok(FlightValidationResponse {
            valid: true,
            message: None,
            price: Some(4500.0 * f64::from(request.seats)),
            available_seats: None,
        })
    }

    async fn decrement_seats(
        &self,
        ctx: &CallContext,
        flight_id: i64,
        date: NaiveDate,
        seats: i32,
    ) -> Result<i32, InventoryError> {
        self.0.decrement_seats(ctx, flight_id, date, seats).await
    }

    async fn increment_seats(&self, flight_id: i64, date: NaiveDate, seats: i32) -> Result<i32, InventoryError> {
        self.0.increment_seats(flight_id, date, seats).await
    }
}

/// Applies the decrement, then loses the reply.
struct LostReplyInventory(Arc<FlightService>);

#[async_trait]
impl FlightInventory for LostReplyInventory {
    async fn validate(
        &self,
        ctx: &CallContext,
        request: &FlightValidationRequest,
    ) -> Result<FlightValidationResponse, InventoryError> {
        self.0.validate(ctx, request).await
    }

    async fn decrement_seats(
        &self,
        ctx: &CallContext,
        flight_id: i64,
        date: NaiveDate,
        seats: i32,
    ) -> Result<i32, InventoryError> {
        self.0.decrement_seats(ctx, flight_id, date, seats).await?;
        Err(StoreError::unavailable("connection reset").into())
    }

    async fn increment_seats(&self, flight_id: i64, date: NaiveDate, seats: i32) -> Result<i32, InventoryError> {
        self.0.increment_seats(flight_id, date, seats).await
    }
}

struct Harness {
    store: Arc<MemoryInventoryStore>,
    cache: Arc<MemoryCache>,
    flights: Arc<FlightService>,
    orchestrator: BookingOrchestrator,
}

impl Harness {
    fn new(total_seats: i32, gateway: impl PaymentGateway + 'static) -> Self {
        Self::build(total_seats, Arc::new(gateway), |flights| flights as Arc<dyn FlightInventory>)
    }

    fn build(
        total_seats: i32,
        gateway: Arc<dyn PaymentGateway>,
        wrap: impl FnOnce(Arc<FlightService>) -> Arc<dyn FlightInventory>,
    ) -> Self {
        let store = Arc::new(MemoryInventoryStore::with_flights([flight(total_seats)]));
        let cache = Arc::new(MemoryCache::new());
        let flights = Arc::new(FlightService::new(
            store.clone(),
            cache.clone(),
            cache.clone(),
            CatalogSettings::default(),
        ));
        let orchestrator = BookingOrchestrator::new(
            wrap(flights.clone()),
            gateway,
            store.clone(),
            cache.clone(),
            cache.clone(),
            BookingSettings::default(),
        );
        Self {
            store,
            cache,
            flights,
            orchestrator,
        }
    }

    async fn available(&self) -> i32 {
        self.flights
            .inventory()
            .get_available(&CallContext::background(), FLIGHT, date())
            .await
            .unwrap()
    }

    async fn staged(&self, user_id: i64) -> Option<TempBooking> {
        TempBookingStore::get(self.cache.as_ref(), &keys::temp_booking(user_id, FLIGHT))
            .await
            .unwrap()
    }

    fn booked_seats(&self) -> i32 {
        self.store.flight(FLIGHT).unwrap().booked_seats
    }
}

#[tokio::test]
async fn test_successful_booking_is_confirmed_and_recorded() {
    let h = Harness::new(10, SimulatedPaymentGateway::always_succeeds());
    let ctx = CallContext::background();

    let response = h.orchestrator.create_booking(&ctx, &request(7, 2)).await.unwrap();
    assert_eq!(response.status, BookingStatus::Confirmed);
    assert_eq!(response.total_amount, 9000.0);
    assert_eq!(response.message.as_deref(), Some("Booking created successfully"));
    assert!(response.payment_id.is_some());

    assert_eq!(h.available().await, 8);
    assert_eq!(h.booked_seats(), 2);
    assert!(h.staged(7).await.is_none());

    let booking = h
        .orchestrator
        .get_booking(&ctx, response.booking_id.unwrap())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_id, response.payment_id);
}

#[tokio::test]
async fn test_payment_failure_restores_inventory() {
    let h = Harness::new(10, ScriptedGateway::new(vec![Step::Outcome(PaymentStatus::Failed, "Card declined")]));

    let response = h
        .orchestrator
        .create_booking(&CallContext::background(), &request(7, 3))
        .await
        .unwrap();
    assert_eq!(response.status, BookingStatus::Failed);
    assert_eq!(response.message.as_deref(), Some("Card declined"));
    assert!(response.booking_id.is_none());

    assert_eq!(h.available().await, 10);
    assert!(h.staged(7).await.is_none());
    assert_eq!(h.booked_seats(), 0);
}

#[tokio::test]
async fn test_payment_timeout_restores_inventory() {
    let h = Harness::new(
        10,
        ScriptedGateway::new(vec![Step::Outcome(PaymentStatus::Timeout, "Payment gateway timeout")]),
    );

    let response = h
        .orchestrator
        .create_booking(&CallContext::background(), &request(7, 1))
        .await
        .unwrap();
    assert_eq!(response.status, BookingStatus::Failed);
    assert_eq!(response.message.as_deref(), Some("Payment gateway timeout"));
    assert_eq!(h.available().await, 10);
}

#[tokio::test]
async fn test_validation_failures_have_no_side_effects() {
    let gateway = Arc::new(ScriptedGateway::new(vec![]));
    let h = Harness::build(10, gateway.clone(), |flights| flights as Arc<dyn FlightInventory>);
    let ctx = CallContext::background();

    let too_many = h.orchestrator.create_booking(&ctx, &request(7, 11)).await.unwrap();
    assert_eq!(too_many.status, BookingStatus::Failed);
    assert_eq!(
        too_many.message.as_deref(),
        Some("Not enough seats available. Requested: 11, Available: 10")
    );

    let mut unknown = request(7, 1);
    unknown.flight_id = 999;
    let response = h.orchestrator.create_booking(&ctx, &unknown).await.unwrap();
    assert_eq!(response.message.as_deref(), Some("Flight not found"));

    let mut bad_type = request(7, 1);
    bad_type.payment_type = Some("cash".to_string());
    assert!(matches!(
        h.orchestrator.create_booking(&ctx, &bad_type).await,
        Err(BookingError::Validation(_))
    ));

    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    assert!(h.staged(7).await.is_none());
    assert_eq!(h.available().await, 10);
}

#[tokio::test]
async fn test_lost_seat_race_discards_staging_record() {
    let gateway = Arc::new(ScriptedGateway::new(vec![]));
    let h = Harness::build(2, gateway.clone(), |flights| {
        Arc::new(OptimisticInventory(flights)) as Arc<dyn FlightInventory>
    });
    assert_eq!(h.available().await, 2);

    let response = h
        .orchestrator
        .create_booking(&CallContext::background(), &request(7, 3))
        .await
        .unwrap();
    assert_eq!(response.status, BookingStatus::Failed);
    assert_eq!(
        response.message.as_deref(),
        Some("Failed to reserve seats: Not enough seats available. Requested: 3, Available: 2")
    );
    assert!(h.staged(7).await.is_none());
    assert_eq!(h.available().await, 2);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_saga_for_same_user_and_flight_is_rejected() {
    let h = Harness::new(10, SimulatedPaymentGateway::always_succeeds());
    let held = TempBooking::new(7, FLIGHT, 1, 4500.0, date(), chrono::Duration::minutes(15));
    h.cache
        .stage(&keys::temp_booking(7, FLIGHT), &held, Duration::from_secs(900))
        .await
        .unwrap();

    let response = h
        .orchestrator
        .create_booking(&CallContext::background(), &request(7, 1))
        .await
        .unwrap();
    assert_eq!(response.status, BookingStatus::Failed);
    assert_eq!(response.message.as_deref(), Some("booking already in progress"));
    assert_eq!(h.available().await, 10);
    // The other saga's record is untouched.
    assert_eq!(h.staged(7).await, Some(held));
}

#[tokio::test]
async fn test_unreachable_gateway_parks_then_releases() {
    let h = Harness::new(10, ScriptedGateway::new(vec![Step::Unavailable]));
    let ctx = CallContext::background();

    let response = h.orchestrator.create_booking(&ctx, &request(7, 2)).await.unwrap();
    assert_eq!(response.status, BookingStatus::Pending);
    assert_eq!(response.message.as_deref(), Some("Payment pending, please retry"));

    // Reservation and staging record are kept for reconciliation.
    assert_eq!(h.available().await, 8);
    assert_eq!(h.staged(7).await.unwrap().state, HoldState::Parked);

    let settled = h
        .orchestrator
        .reconcile_pending(&ctx, 7, FLIGHT, PaymentResolution::NotCharged)
        .await
        .unwrap();
    assert_eq!(settled.status, BookingStatus::Failed);
    assert_eq!(h.available().await, 10);
    assert!(h.staged(7).await.is_none());

    // Settling twice must not release the seats twice.
    assert!(matches!(
        h.orchestrator
            .reconcile_pending(&ctx, 7, FLIGHT, PaymentResolution::NotCharged)
            .await,
        Err(BookingError::NotFound(_))
    ));
    assert_eq!(h.available().await, 10);
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_rejected_while_saga_is_paying() {
    let h = Arc::new(Harness::new(
        10,
        ScriptedGateway::new(vec![Step::Outcome(PaymentStatus::Failed, "Card declined")])
            .slow(Duration::from_secs(5)),
    ));

    let saga = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.orchestrator
                .create_booking(&CallContext::background(), &request(7, 2))
                .await
                .unwrap()
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.staged(7).await.unwrap().state, HoldState::Active);

    let err = h
        .orchestrator
        .reconcile_pending(&CallContext::background(), 7, FLIGHT, PaymentResolution::NotCharged)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::NotReconcilable {
            state: HoldState::Active
        }
    );
    // The running saga still owns its hold.
    assert_eq!(h.available().await, 8);
    assert!(h.staged(7).await.is_some());

    let response = saga.await.unwrap();
    assert_eq!(response.status, BookingStatus::Failed);
    assert_eq!(h.available().await, 10);
    assert!(h.staged(7).await.is_none());
    assert_eq!(h.booked_seats(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settlements_confirm_once() {
    let h = Arc::new(Harness::new(10, ScriptedGateway::new(vec![Step::Unavailable])));
    let response = h
        .orchestrator
        .create_booking(&CallContext::background(), &request(7, 2))
        .await
        .unwrap();
    assert_eq!(response.status, BookingStatus::Pending);

    let mut handles = Vec::new();
    for n in 0..2 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.orchestrator
                .reconcile_pending(
                    &CallContext::background(),
                    7,
                    FLIGHT,
                    PaymentResolution::Settled {
                        payment_id: format!("pay-settle-{}", n),
                    },
                )
                .await
        }));
    }

    let mut confirmed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(response) => {
                assert_eq!(response.status, BookingStatus::Confirmed);
                confirmed += 1;
            }
            Err(BookingError::NotFound(_)) | Err(BookingError::NotReconcilable { state: HoldState::Resolving }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(confirmed, 1);
    assert_eq!(h.booked_seats(), 2);
    assert_eq!(h.available().await, 8);
    assert!(h.staged(7).await.is_none());
}

#[tokio::test]
async fn test_lost_decrement_reply_parks_with_hold() {
    let gateway = Arc::new(ScriptedGateway::new(vec![]));
    let h = Harness::build(10, gateway.clone(), |flights| {
        Arc::new(LostReplyInventory(flights)) as Arc<dyn FlightInventory>
    });
    let ctx = CallContext::background();

    let response = h.orchestrator.create_booking(&ctx, &request(7, 2)).await.unwrap();
    assert_eq!(response.status, BookingStatus::Pending);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    // The decrement landed, so the hold stays until someone settles it.
    assert_eq!(h.available().await, 8);
    assert_eq!(h.staged(7).await.unwrap().state, HoldState::Parked);

    let settled = h
        .orchestrator
        .reconcile_pending(&ctx, 7, FLIGHT, PaymentResolution::NotCharged)
        .await
        .unwrap();
    assert_eq!(settled.status, BookingStatus::Failed);
    assert_eq!(h.available().await, 10);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_caller_during_payment_leaves_pending() {
    let h = Harness::new(
        10,
        ScriptedGateway::new(vec![Step::Outcome(PaymentStatus::Success, "ok")]).slow(Duration::from_secs(10)),
    );

    let (ctx, handle) = CallContext::background().cancellable();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let response = h.orchestrator.create_booking(&ctx, &request(7, 2)).await.unwrap();
    canceller.await.unwrap();
    assert_eq!(response.status, BookingStatus::Pending);
    assert_eq!(h.available().await, 8);
    assert!(h.staged(7).await.is_some());
    assert_eq!(h.booked_seats(), 0);

    // The charge turned out to have gone through.
    let settled = h
        .orchestrator
        .reconcile_pending(
            &CallContext::background(),
            7,
            FLIGHT,
            PaymentResolution::Settled {
                payment_id: "pay-late".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(settled.status, BookingStatus::Confirmed);
    assert_eq!(settled.payment_id.as_deref(), Some("pay-late"));
    assert_eq!(settled.total_amount, 9000.0);
    assert_eq!(h.available().await, 8);
    assert_eq!(h.booked_seats(), 2);
    assert!(h.staged(7).await.is_none());
}

#[tokio::test]
async fn test_cancel_before_reserving_touches_nothing() {
    let gateway = Arc::new(ScriptedGateway::new(vec![]));
    let h = Harness::build(10, gateway.clone(), |flights| flights as Arc<dyn FlightInventory>);
    h.available().await;

    let (ctx, handle) = CallContext::background().cancellable();
    handle.cancel();
    let err = h.orchestrator.create_booking(&ctx, &request(7, 2)).await.unwrap_err();
    assert_eq!(err, BookingError::Interrupted(Interrupted::Cancelled));
    assert_eq!(h.available().await, 10);
    assert!(h.staged(7).await.is_none());
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_paid_but_unrecorded_compensates_and_reports() {
    let store_slot: Arc<Mutex<Option<Arc<MemoryInventoryStore>>>> = Arc::new(Mutex::new(None));
    let hook_slot = Arc::clone(&store_slot);
    let gateway = ScriptedGateway::new(vec![Step::Outcome(PaymentStatus::Success, "ok")]).on_call(move || {
        // Durable store goes down between the charge and the write.
        if let Some(store) = hook_slot.lock().unwrap().as_ref() {
            store.set_unavailable(true);
        }
    });
    let h = Harness::new(10, gateway);
    *store_slot.lock().unwrap() = Some(h.store.clone());

    let err = h
        .orchestrator
        .create_booking(&CallContext::background(), &request(7, 2))
        .await
        .unwrap_err();
    match err {
        BookingError::PaidButUnrecorded { payment_id, .. } => assert_eq!(payment_id, "pay-0"),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(h.available().await, 10);
    assert!(h.staged(7).await.is_none());
    h.store.set_unavailable(false);
    assert_eq!(h.booked_seats(), 0);
}

#[tokio::test]
async fn test_cancel_twice_second_fails() {
    let h = Harness::new(10, SimulatedPaymentGateway::always_succeeds());
    let ctx = CallContext::background();

    let response = h.orchestrator.create_booking(&ctx, &request(7, 2)).await.unwrap();
    let booking_id = response.booking_id.unwrap();
    // Warm the booking cache so the second cancel would see a stale status there.
    h.orchestrator.get_booking(&ctx, booking_id).await.unwrap();

    let cancelled = h.orchestrator.cancel_booking(&ctx, booking_id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(h.available().await, 10);
    assert_eq!(h.booked_seats(), 0);

    let err = h.orchestrator.cancel_booking(&ctx, booking_id).await.unwrap_err();
    assert_eq!(
        err,
        BookingError::CannotCancel {
            status: BookingStatus::Cancelled
        }
    );
    assert_eq!(h.available().await, 10);

    let reread = h.orchestrator.get_booking(&ctx, booking_id).await.unwrap();
    assert_eq!(reread.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let h = Harness::new(10, SimulatedPaymentGateway::always_succeeds());
    let ctx = CallContext::background();

    assert!(matches!(
        h.orchestrator.get_booking(&ctx, 404).await,
        Err(BookingError::NotFound(_))
    ));
    assert!(matches!(
        h.orchestrator.cancel_booking(&ctx, 404).await,
        Err(BookingError::NotFound(_))
    ));
    assert!(matches!(
        h.orchestrator
            .reconcile_pending(&ctx, 7, FLIGHT, PaymentResolution::NotCharged)
            .await,
        Err(BookingError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_bookings_never_oversell() {
    let h = Arc::new(Harness::new(10, SimulatedPaymentGateway::always_succeeds()));
    h.available().await;

    let mut handles = Vec::new();
    for user_id in 1..=25 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.orchestrator
                .create_booking(&CallContext::background(), &request(user_id, 1))
                .await
                .unwrap()
        }));
    }

    let mut confirmed = 0;
    for handle in handles {
        if handle.await.unwrap().status == BookingStatus::Confirmed {
            confirmed += 1;
        }
    }
    assert_eq!(confirmed, 10);
    assert_eq!(h.available().await, 0);
    assert_eq!(h.booked_seats(), 10);
    assert_eq!(h.store.read_available(FLIGHT, date()).await.unwrap(), 0);
}
