use crate::config::AppConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Type alias for a database connection pool.
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool using the application configuration.
pub async fn connect(config: &AppConfig) -> Result<DbPool, sea_orm::DbErr> {
    connect_url(&config.database_url, config.db_max_connections).await
}

/// Establishes a connection pool to the given database URL.
pub async fn connect_url(database_url: &str, max_connections: u32) -> Result<DbPool, sea_orm::DbErr> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    let pool = Database::connect(options).await?;
    info!("database connection established");
    Ok(pool)
}
