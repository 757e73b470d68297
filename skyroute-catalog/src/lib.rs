pub mod flights;
pub mod inventory;
pub mod pathfinder;
pub mod search;
pub mod singleflight;

pub use flights::{CatalogSettings, FlightInventory, FlightService};
pub use inventory::{InventoryError, SeatInventoryCache};
pub use pathfinder::ItineraryPathFinder;
pub use search::{SearchError, SearchResultCache};
pub use singleflight::SingleFlight;
