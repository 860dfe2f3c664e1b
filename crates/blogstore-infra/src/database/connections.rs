use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

use blogstore_core::error::RepoError;

use super::errors::map_db_err;

/// Connection settings for the store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Log every statement through sqlx.
    pub sqlx_logging: bool,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            sqlx_logging: false,
        }
    }

    /// Every connection to an in-memory SQLite database opens a separate,
    /// empty database, so those pools are pinned to one connection.
    pub fn is_in_memory(&self) -> bool {
        self.url.starts_with("sqlite") && self.url.contains(":memory:")
    }

    fn pool_bounds(&self) -> (u32, u32) {
        if self.is_in_memory() {
            return (1, 1);
        }
        let max = self.max_connections.max(1);
        (max, self.min_connections.min(max))
    }
}

/// Open the connection pool described by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, RepoError> {
    let (max, min) = config.pool_bounds();
    tracing::info!(max_connections = max, "Connecting to database");

    let mut opts = ConnectOptions::new(config.url.clone());
    opts.max_connections(max)
        .min_connections(min)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(config.sqlx_logging);
    if !config.is_in_memory() {
        opts.idle_timeout(Duration::from_secs(300));
    }

    let db = Database::connect(opts).await.map_err(map_db_err)?;
    tracing::info!(backend = ?db.get_database_backend(), "Database connected");
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pool_is_pinned() {
        let config = DatabaseConfig {
            max_connections: 20,
            ..DatabaseConfig::new("sqlite::memory:")
        };
        assert!(config.is_in_memory());
        assert_eq!(config.pool_bounds(), (1, 1));
    }

    #[test]
    fn test_pool_bounds_are_ordered() {
        let config = DatabaseConfig {
            max_connections: 4,
            min_connections: 9,
            ..DatabaseConfig::new("postgres://localhost/blog")
        };
        assert_eq!(config.pool_bounds(), (4, 4));
    }
}
