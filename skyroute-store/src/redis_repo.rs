use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use skyroute_core::models::{Booking, Flight, HoldState, TempBooking};
use skyroute_core::repository::{
    BookingCache, SearchCacheStore, SeatCounter, SeatDecrement, TempBookingStore,
};
use skyroute_core::{StoreError, StoreResult};

/// Check-and-subtract in one server-side step. Replies `{status, value}`:
/// `{1, remaining}`, `{0, current}` when short, `{-1, 0}` when the key is absent.
const DECREMENT_SEATS: &str = r#"
    local current = redis.call("GET", KEYS[1])
    if not current then
        return {-1, 0}
    end
    local available = tonumber(current)
    local requested = tonumber(ARGV[1])
    if available < requested then
        return {0, available}
    end
    return {1, redis.call("DECRBY", KEYS[1], requested)}
"#;

/// INCRBY that never materialises a missing key.
const INCREMENT_SEATS: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 1 then
        return redis.call("INCRBY", KEYS[1], ARGV[1])
    else
        return nil
    end
"#;

/// SET NX EX, then report whichever value won.
const SEED_SEATS: &str = r#"
    if redis.call("SET", KEYS[1], ARGV[1], "NX", "EX", ARGV[2]) then
        return tonumber(ARGV[1])
    end
    return tonumber(redis.call("GET", KEYS[1]))
"#;

/// Replace a value only if it still reads exactly as the caller saw it.
/// KEEPTTL leaves the staging record's expiry untouched.
const SWAP_IF_UNCHANGED: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        redis.call("SET", KEYS[1], ARGV[2], "KEEPTTL")
        return 1
    end
    return 0
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> StoreResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::unavailable)
    }

    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key).await.map_err(StoreError::unavailable)?;
        match raw {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(StoreError::corrupt),
            None => Ok(None),
        }
    }

    async fn set_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> StoreResult<()> {
        let payload = serde_json::to_string(value).map_err(StoreError::corrupt)?;
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, payload, ttl_seconds(ttl))
            .await
            .map_err(StoreError::unavailable)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await.map_err(StoreError::unavailable)
    }
}

/// Redis rejects a zero expiry.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl SeatCounter for RedisClient {
    async fn get(&self, key: &str) -> StoreResult<Option<i32>> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(StoreError::unavailable)
    }

    async fn seed(&self, key: &str, count: i32, ttl: Duration) -> StoreResult<i32> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(SEED_SEATS);
        let value: i32 = script
            .key(key)
            .arg(count)
            .arg(ttl_seconds(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::unavailable)?;
        debug!(key, value, "Seat count seeded");
        Ok(value)
    }

    async fn decrement(&self, key: &str, seats: i32) -> StoreResult<SeatDecrement> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(DECREMENT_SEATS);
        let (status, value): (i64, i64) = script
            .key(key)
            .arg(seats)
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::unavailable)?;

        let value = i32::try_from(value).map_err(StoreError::corrupt)?;
        match status {
            1 => Ok(SeatDecrement::Applied(value)),
            0 => Ok(SeatDecrement::Insufficient(value)),
            -1 => Ok(SeatDecrement::Missing),
            other => Err(StoreError::Corrupt(format!("unexpected decrement status {}", other))),
        }
    }

    async fn increment(&self, key: &str, seats: i32) -> StoreResult<Option<i32>> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(INCREMENT_SEATS);
        script
            .key(key)
            .arg(seats)
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::unavailable)
    }
}

#[async_trait]
impl SearchCacheStore for RedisClient {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<Flight>>> {
        self.get_json(key).await
    }

    async fn put(&self, key: &str, flights: &[Flight], ttl: Duration) -> StoreResult<()> {
        self.set_json(key, flights, ttl).await
    }
}

#[async_trait]
impl TempBookingStore for RedisClient {
    async fn stage(&self, key: &str, booking: &TempBooking, ttl: Duration) -> StoreResult<bool> {
        let payload = serde_json::to_string(booking).map_err(StoreError::corrupt)?;
        let mut conn = self.conn().await?;

        // SET NX: only one saga per (user, flight) may hold the staging slot
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(StoreError::unavailable)?;

        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<TempBooking>> {
        self.get_json(key).await
    }

    async fn transition(&self, key: &str, from: HoldState, to: HoldState) -> StoreResult<Option<TempBooking>> {
        let mut conn = self.conn().await?;
        let current: Option<String> = conn.get(key).await.map_err(StoreError::unavailable)?;
        let Some(current) = current else {
            return Ok(None);
        };

        let mut temp: TempBooking = serde_json::from_str(&current).map_err(StoreError::corrupt)?;
        if temp.state != from {
            return Ok(None);
        }
        temp.state = to;
        let updated = serde_json::to_string(&temp).map_err(StoreError::corrupt)?;

        // A concurrent writer changed the record between GET and here: it won.
        let swapped: i32 = redis::Script::new(SWAP_IF_UNCHANGED)
            .key(key)
            .arg(&current)
            .arg(&updated)
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::unavailable)?;
        debug!(key, from = ?from, to = ?to, swapped, "Hold state compare-and-set");
        Ok((swapped == 1).then_some(temp))
    }

    async fn discard(&self, key: &str) -> StoreResult<()> {
        self.delete(key).await
    }
}

#[async_trait]
impl BookingCache for RedisClient {
    async fn get(&self, key: &str) -> StoreResult<Option<Booking>> {
        self.get_json(key).await
    }

    async fn put(&self, key: &str, booking: &Booking, ttl: Duration) -> StoreResult<()> {
        self.set_json(key, booking, ttl).await
    }

    async fn evict(&self, key: &str) -> StoreResult<()> {
        self.delete(key).await
    }
}
