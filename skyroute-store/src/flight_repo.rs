use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::info;

use skyroute_core::models::{Booking, BookingStatus, Flight, NewBooking};
use skyroute_core::repository::InventoryStore;
use skyroute_core::{StoreError, StoreResult};

pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: i64,
    flight_number: String,
    source: String,
    destination: String,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    total_seats: i32,
    booked_seats: i32,
    price: f64,
    created_at: DateTime<Utc>,
}

impl From<FlightRow> for Flight {
    fn from(row: FlightRow) -> Self {
        Flight {
            id: row.id,
            flight_number: row.flight_number,
            source: row.source,
            destination: row.destination,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            total_seats: row.total_seats,
            booked_seats: row.booked_seats,
            price: row.price,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    user_id: i64,
    flight_id: i64,
    seats: i32,
    total_amount: f64,
    status: String,
    payment_id: Option<String>,
    date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<BookingStatus>().map_err(StoreError::Corrupt)?;
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            flight_id: row.flight_id,
            seats: row.seats,
            total_amount: row.total_amount,
            status,
            payment_id: row.payment_id,
            date: row.date,
            created_at: row.created_at,
        })
    }
}

const FLIGHT_COLUMNS: &str = "id, flight_number, source, destination, departure_time, arrival_time, \
     total_seats, booked_seats, price, created_at";

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn read_available(&self, flight_id: i64, date: NaiveDate) -> StoreResult<i32> {
        let available: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT total_seats - booked_seats
            FROM flights
            WHERE id = $1 AND (departure_time AT TIME ZONE 'UTC')::date = $2
            "#,
        )
        .bind(flight_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;

        available.ok_or_else(|| StoreError::NotFound(format!("flight {} on {}", flight_id, date)))
    }

    async fn read_flight(&self, flight_id: i64) -> StoreResult<Option<Flight>> {
        let sql = format!("SELECT {} FROM flights WHERE id = $1", FLIGHT_COLUMNS);
        let row = sqlx::query_as::<_, FlightRow>(&sql)
            .bind(flight_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::unavailable)?;

        Ok(row.map(Flight::from))
    }

    async fn flights_on(&self, date: NaiveDate) -> StoreResult<Vec<Flight>> {
        let sql = format!(
            "SELECT {} FROM flights WHERE (departure_time AT TIME ZONE 'UTC')::date = $1 ORDER BY departure_time",
            FLIGHT_COLUMNS
        );
        let rows = sqlx::query_as::<_, FlightRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::unavailable)?;

        Ok(rows.into_iter().map(Flight::from).collect())
    }

    async fn create_booking(&self, booking: &NewBooking) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await.map_err(StoreError::unavailable)?;

        if booking.status == BookingStatus::Confirmed {
            let updated = sqlx::query(
                r#"
                UPDATE flights
                SET booked_seats = booked_seats + $2
                WHERE id = $1 AND booked_seats + $2 <= total_seats
                "#,
            )
            .bind(booking.flight_id)
            .bind(booking.seats)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::unavailable)?;

            if updated.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!(
                    "flight {} cannot take {} more seats",
                    booking.flight_id, booking.seats
                )));
            }
        }

        let booking_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bookings (user_id, flight_id, seats, total_amount, status, payment_id, date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(booking.user_id)
        .bind(booking.flight_id)
        .bind(booking.seats)
        .bind(booking.total_amount)
        .bind(booking.status.as_str())
        .bind(booking.payment_id.as_deref())
        .bind(booking.date)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::unavailable)?;

        tx.commit().await.map_err(StoreError::unavailable)?;

        info!(booking_id, flight_id = booking.flight_id, status = %booking.status, "Booking persisted");
        Ok(booking_id)
    }

    async fn read_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, user_id, flight_id, seats, total_amount, status, payment_id, date, created_at
            FROM bookings
            WHERE id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;

        row.map(Booking::try_from).transpose()
    }

    async fn update_booking_status(&self, booking_id: i64, status: BookingStatus) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::unavailable)?;

        let current: Option<(String, i64, i32)> = sqlx::query_as(
            "SELECT status, flight_id, seats FROM bookings WHERE id = $1 FOR UPDATE",
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::unavailable)?;

        let (current, flight_id, seats) =
            current.ok_or_else(|| StoreError::NotFound(format!("booking {}", booking_id)))?;
        let current = current.parse::<BookingStatus>().map_err(StoreError::Corrupt)?;

        if !current.can_transition_to(status) {
            return Err(StoreError::Conflict(format!(
                "booking {} cannot move from {} to {}",
                booking_id, current, status
            )));
        }

        sqlx::query("UPDATE bookings SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::unavailable)?;

        if current == BookingStatus::Confirmed && status == BookingStatus::Cancelled {
            sqlx::query("UPDATE flights SET booked_seats = GREATEST(booked_seats - $2, 0) WHERE id = $1")
                .bind(flight_id)
                .bind(seats)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::unavailable)?;
        }

        tx.commit().await.map_err(StoreError::unavailable)?;
        Ok(())
    }
}
