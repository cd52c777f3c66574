//! Persistence for device and schedule records.
//!
//! Two [`DeviceRegistry`](latchkey_core::registry::DeviceRegistry)
//! implementations live here: [`PgDeviceRegistry`] backed by PostgreSQL,
//! and [`InMemoryRegistry`] for development runs and tests.

use sqlx::postgres::PgPoolOptions;

pub mod listener;
pub mod memory;
pub mod models;
pub mod registry;
pub mod repositories;

pub use memory::InMemoryRegistry;
pub use registry::PgDeviceRegistry;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the pool can reach the server.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
