pub mod flight_client;
pub mod orchestrator;
pub mod payment;
pub mod saga;

pub use orchestrator::{
    BookingError, BookingOrchestrator, BookingSettings, PaymentResolution, ReconcileRequest,
};
pub use flight_client::HttpFlightInventory;
pub use payment::{ForcedOutcome, HttpPaymentGateway, SimulatedPaymentGateway};
pub use saga::{BookingSaga, Compensation, SagaState};
