use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub flights: FlightsConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local maps; nothing survives a restart.
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// JSON array of flights loaded into the memory backend at start-up.
    pub seed_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    #[default]
    Simulated,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    #[serde(default)]
    pub mode: PaymentMode,
    /// Base URL of the payment service when `mode = "http"`.
    pub url: Option<String>,
    #[serde(default = "default_payment_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
    #[serde(default = "default_timeout_rate")]
    pub timeout_rate: f64,
    #[serde(default = "default_processing_ms")]
    pub processing_ms: u64,
}

fn default_payment_timeout_ms() -> u64 { 30_000 }
fn default_failure_rate() -> f64 { 0.15 }
fn default_timeout_rate() -> f64 { 0.05 }
fn default_processing_ms() -> u64 { 2_000 }

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mode: PaymentMode::default(),
            url: None,
            timeout_ms: default_payment_timeout_ms(),
            failure_rate: default_failure_rate(),
            timeout_rate: default_timeout_rate(),
            processing_ms: default_processing_ms(),
        }
    }
}

/// Where the booking saga validates and reserves seats. Without a `url` it
/// uses this process's own flight service.
#[derive(Debug, Deserialize, Clone)]
pub struct FlightsConfig {
    pub url: Option<String>,
    #[serde(default = "default_flights_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_flights_timeout_ms() -> u64 { 10_000 }

impl Default for FlightsConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_flights_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_temp_booking_seconds")]
    pub temp_booking_seconds: u64,
    #[serde(default = "default_seat_cache_seconds")]
    pub seat_cache_seconds: u64,
    #[serde(default = "default_search_cache_seconds")]
    pub search_cache_seconds: u64,
    #[serde(default = "default_booking_cache_seconds")]
    pub booking_cache_seconds: u64,
    #[serde(default = "default_connection_window_minutes")]
    pub connection_window_minutes: i64,
    #[serde(default = "default_max_stops")]
    pub max_stops: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_temp_booking_seconds() -> u64 { 15 * 60 }
fn default_seat_cache_seconds() -> u64 { 60 * 60 }
fn default_search_cache_seconds() -> u64 { 2 * 60 * 60 }
fn default_booking_cache_seconds() -> u64 { 30 * 60 }
fn default_connection_window_minutes() -> i64 { 4 * 60 }
fn default_max_stops() -> usize { 3 }
fn default_max_results() -> usize { 20 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            temp_booking_seconds: default_temp_booking_seconds(),
            seat_cache_seconds: default_seat_cache_seconds(),
            search_cache_seconds: default_search_cache_seconds(),
            booking_cache_seconds: default_booking_cache_seconds(),
            connection_window_minutes: default_connection_window_minutes(),
            max_stops: default_max_stops(),
            max_results: default_max_results(),
        }
    }
}

impl BusinessRules {
    pub fn temp_booking_ttl(&self) -> Duration {
        Duration::from_secs(self.temp_booking_seconds)
    }

    pub fn seat_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.seat_cache_seconds)
    }

    pub fn search_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.search_cache_seconds)
    }

    pub fn booking_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.booking_cache_seconds)
    }

    pub fn connection_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.connection_window_minutes)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SKYROUTE_SERVER__PORT=9090`
            .add_source(config::Environment::with_prefix("SKYROUTE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
