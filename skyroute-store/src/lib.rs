pub mod app_config;
pub mod database;
pub mod flight_repo;
pub mod memory;
pub mod redis_repo;

pub use database::DbClient;
pub use flight_repo::PostgresInventoryStore;
pub use memory::{MemoryCache, MemoryInventoryStore};
pub use redis_repo::RedisClient;
