use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Flights & Itineraries
// ============================================================================

/// A single scheduled flight leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: i64,
    pub flight_number: String,
    pub source: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub total_seats: i32,
    pub booked_seats: i32,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

impl Flight {
    pub fn available_seats(&self) -> i32 {
        self.total_seats - self.booked_seats
    }

    pub fn can_book(&self, seats: i32) -> bool {
        self.available_seats() >= seats
    }

    pub fn departure_date(&self) -> NaiveDate {
        self.departure_time.date_naive()
    }
}

/// A bookable journey: one or more legs chained source-to-destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPath {
    pub flights: Vec<Flight>,
    pub total_price: f64,
    pub total_time_minutes: i64,
    pub stops: usize,
}

impl FlightPath {
    pub fn new(flights: Vec<Flight>) -> Self {
        let total_price = flights.iter().map(|f| f.price).sum();
        let total_time_minutes = match (flights.first(), flights.last()) {
            (Some(first), Some(last)) => (last.arrival_time - first.departure_time).num_minutes(),
            _ => 0,
        };
        let stops = flights.len().saturating_sub(1);

        Self {
            flights,
            total_price,
            total_time_minutes,
            stops,
        }
    }

    /// Identity of the itinerary: its ordered leg ids.
    pub fn leg_ids(&self) -> Vec<i64> {
        self.flights.iter().map(|f| f.id).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Cheapest,
    Fastest,
}

impl SortBy {
    /// Stable sort; ties go to the itinerary with fewer stops.
    pub fn sort(self, paths: &mut [FlightPath]) {
        match self {
            SortBy::Cheapest => paths.sort_by(|a, b| {
                a.total_price
                    .total_cmp(&b.total_price)
                    .then(a.stops.cmp(&b.stops))
            }),
            SortBy::Fastest => paths.sort_by(|a, b| {
                a.total_time_minutes
                    .cmp(&b.total_time_minutes)
                    .then(a.stops.cmp(&b.stops))
            }),
        }
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "cheapest" => Ok(SortBy::Cheapest),
            "fastest" => Ok(SortBy::Fastest),
            other => Err(format!(
                "Invalid sort_by parameter '{}'. Must be 'cheapest' or 'fastest'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub source: String,
    pub destination: String,
    pub date: NaiveDate,
    pub seats: i32,
    #[serde(default)]
    pub sort_by: SortBy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub paths: Vec<FlightPath>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightValidationRequest {
    pub flight_id: i64,
    pub seats: i32,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightValidationResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_seats: Option<i32>,
}

impl FlightValidationResponse {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatUpdateRequest {
    pub flight_id: i64,
    pub seats: i32,
    pub date: NaiveDate,
}

// ============================================================================
// Bookings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Failed => "failed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Monotonic lifecycle; the only backwards edge is `confirmed -> cancelled`.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Failed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "failed" => Ok(BookingStatus::Failed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// Durable booking record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub flight_id: i64,
    pub seats: i32,
    pub total_amount: f64,
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn can_cancel(&self) -> bool {
        matches!(self.status, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

/// Insert shape for [`Booking`]; the store assigns id and creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub user_id: i64,
    pub flight_id: i64,
    pub seats: i32,
    pub total_amount: f64,
    pub status: BookingStatus,
    pub payment_id: Option<String>,
    pub date: NaiveDate,
}

/// Who owns a staging record's seats right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    /// The saga that staged it is still running.
    #[default]
    Active,
    /// The saga parked as `pending` and handed the hold to reconciliation.
    Parked,
    /// One reconciliation has claimed the hold and is settling it.
    Resolving,
}

/// Staging record for a saga between seat reservation and its terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempBooking {
    pub user_id: i64,
    pub flight_id: i64,
    pub seats: i32,
    pub total_amount: f64,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub state: HoldState,
}

impl TempBooking {
    pub fn new(
        user_id: i64,
        flight_id: i64,
        seats: i32,
        total_amount: f64,
        date: NaiveDate,
        lifetime: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            flight_id,
            seats,
            total_amount,
            date,
            created_at: now,
            expires_at: now + lifetime,
            state: HoldState::Active,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub user_id: i64,
    pub flight_id: i64,
    pub seats: i32,
    pub date: NaiveDate,
    #[serde(default)]
    pub payment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<i64>,
    pub status: BookingStatus,
    pub total_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn flight(id: i64, price: f64, dep_hour: u32, arr_hour: u32) -> Flight {
        Flight {
            id,
            flight_number: format!("AI{}", id),
            source: "DEL".to_string(),
            destination: "BOM".to_string(),
            departure_time: Utc.with_ymd_and_hms(2025, 3, 14, dep_hour, 0, 0).unwrap(),
            arrival_time: Utc.with_ymd_and_hms(2025, 3, 14, arr_hour, 0, 0).unwrap(),
            total_seats: 180,
            booked_seats: 20,
            price,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_flight_path_derived_fields() {
        let path = FlightPath::new(vec![flight(1, 3000.0, 6, 8), flight(2, 2500.0, 10, 13)]);
        assert_eq!(path.total_price, 5500.0);
        assert_eq!(path.total_time_minutes, 7 * 60);
        assert_eq!(path.stops, 1);
        assert_eq!(path.leg_ids(), vec![1, 2]);

        let empty = FlightPath::new(vec![]);
        assert_eq!(empty.total_time_minutes, 0);
        assert_eq!(empty.stops, 0);
    }

    #[test]
    fn test_sort_by_parsing_and_ordering() {
        assert_eq!("".parse::<SortBy>().unwrap(), SortBy::Cheapest);
        assert_eq!("fastest".parse::<SortBy>().unwrap(), SortBy::Fastest);
        assert!("priciest".parse::<SortBy>().is_err());

        let mut paths = vec![
            FlightPath::new(vec![flight(1, 5000.0, 6, 8)]),
            FlightPath::new(vec![flight(2, 3000.0, 6, 10)]),
        ];
        SortBy::Cheapest.sort(&mut paths);
        assert_eq!(paths[0].flights[0].id, 2);
        SortBy::Fastest.sort(&mut paths);
        assert_eq!(paths[0].flights[0].id, 1);
    }

    #[test]
    fn test_booking_status_lifecycle() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Failed.can_transition_to(Cancelled));
        assert_eq!("cancelled".parse::<BookingStatus>().unwrap(), Cancelled);
        assert_eq!(serde_json::to_string(&Confirmed).unwrap(), "\"confirmed\"");
    }

    #[test]
    fn test_search_request_defaults_to_cheapest() {
        let json = r#"{"source":"DEL","destination":"BOM","date":"2025-03-14","seats":2}"#;
        let req: SearchRequest = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(req.sort_by, SortBy::Cheapest);
        assert_eq!(req.date, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
    }

    #[test]
    fn test_staging_record_without_state_reads_as_active() {
        let mut temp = TempBooking::new(
            1,
            2,
            2,
            9000.0,
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            Duration::minutes(15),
        );
        assert_eq!(temp.state, HoldState::Active);

        temp.state = HoldState::Parked;
        let json = serde_json::to_value(&temp).unwrap();
        assert_eq!(json["state"], "parked");

        let mut legacy = json.clone();
        legacy.as_object_mut().unwrap().remove("state");
        let read: TempBooking = serde_json::from_value(legacy).unwrap();
        assert_eq!(read.state, HoldState::Active);
    }
}
