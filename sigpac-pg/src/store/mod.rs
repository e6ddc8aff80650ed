//! Persistance PostGIS des parcelles sauvegardées

pub mod geomhash;
pub mod pool;
pub mod postgres;

pub use pool::{create_pool, test_connection, DatabaseConfig, SslMode};
pub use postgres::PgParcelStore;
