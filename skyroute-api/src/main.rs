use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skyroute_api::{app, AppState, Backends};
use skyroute_core::models::Flight;
use skyroute_core::payment::PaymentGateway;
use skyroute_order::{HttpFlightInventory, HttpPaymentGateway, SimulatedPaymentGateway};
use skyroute_store::app_config::{Config, PaymentMode, StorageBackend};
use skyroute_store::{DbClient, MemoryCache, MemoryInventoryStore, PostgresInventoryStore, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "skyroute_api=debug,skyroute_order=info,skyroute_catalog=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting SkyRoute API on port {}", config.server.port);

    let backends = match config.storage.backend {
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            db.ping().await.context("Postgres ping failed")?;

            let redis = RedisClient::new(&config.redis.url)
                .await
                .context("Failed to connect to Redis")?;
            redis.ping().await.context("Redis ping failed")?;
            let redis = Arc::new(redis);

            Backends {
                store: Arc::new(PostgresInventoryStore::new(db.pool.clone())),
                seats: redis.clone(),
                search_cache: redis.clone(),
                temp_bookings: redis.clone(),
                booking_cache: redis,
            }
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; nothing survives a restart");
            let store = MemoryInventoryStore::new();
            if let Some(path) = &config.storage.seed_file {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read seed file {}", path))?;
                let flights: Vec<Flight> = serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse seed file {}", path))?;
                tracing::info!("Seeded {} flights from {}", flights.len(), path);
                for flight in flights {
                    store.insert_flight(flight);
                }
            }
            let cache = Arc::new(MemoryCache::new());
            Backends {
                store: Arc::new(store),
                seats: cache.clone(),
                search_cache: cache.clone(),
                temp_bookings: cache.clone(),
                booking_cache: cache,
            }
        }
    };

    let payment = &config.payment;
    let simulator = SimulatedPaymentGateway::new(
        payment.failure_rate,
        payment.timeout_rate,
        Duration::from_millis(payment.processing_ms),
    );
    let payments: Arc<dyn PaymentGateway> = match payment.mode {
        PaymentMode::Simulated => Arc::new(simulator.clone()),
        PaymentMode::Http => {
            let url = payment
                .url
                .as_deref()
                .context("payment.url is required when payment.mode = \"http\"")?;
            tracing::info!("Forwarding payments to {}", url);
            Arc::new(HttpPaymentGateway::new(url, Duration::from_millis(payment.timeout_ms))?)
        }
    };

    let state = match &config.flights.url {
        Some(url) => {
            tracing::info!("Booking against the flight service at {}", url);
            let remote = HttpFlightInventory::new(url, Duration::from_millis(config.flights.timeout_ms))?;
            AppState::with_remote_flights(backends, payments, Arc::new(remote), &config.business_rules)
        }
        None => AppState::new(backends, payments, &config.business_rules),
    }
    .with_simulator(simulator);
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
