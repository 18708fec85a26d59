//! Store models, the store capability and its adapters.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod seed;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::WeatherStore;
