//! Cache key layout shared by every fast-path backend.
//!
//! These formats are part of the external contract: operators inspect and
//! repair keys by hand, so they must not drift between backends.

use chrono::NaiveDate;

/// Unfiltered candidate flights for a route on a date.
pub fn search(source: &str, destination: &str, date: NaiveDate) -> String {
    format!("flight_search:{}:{}:{}", source, destination, date)
}

/// Available seat count for one flight on one date.
pub fn seats(flight_id: i64, date: NaiveDate) -> String {
    format!("flight_seats:{}:{}", flight_id, date)
}

/// Staging record of an in-flight booking saga.
pub fn temp_booking(user_id: i64, flight_id: i64) -> String {
    format!("temp_booking:{}:{}", user_id, flight_id)
}

/// Read-through copy of a durable booking.
pub fn booking(booking_id: i64) -> String {
    format!("booking:{}", booking_id)
}
