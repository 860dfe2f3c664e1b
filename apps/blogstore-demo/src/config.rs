//! Demo configuration loaded from environment variables.

use std::env;

use blogstore_infra::{DatabaseConfig, FacadeOptions};

/// Demo configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub facade: FacadeOptions,
    /// `current_month` attaches that scope to every post repository.
    pub post_default_scope: Option<String>,
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut database = DatabaseConfig::new(
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string()),
        );
        if let Some(max) = parsed("DB_MAX_CONNECTIONS") {
            database.max_connections = max;
        }
        if let Some(min) = parsed("DB_MIN_CONNECTIONS") {
            database.min_connections = min;
        }
        database.sqlx_logging = env::var("DB_LOG_STATEMENTS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let mut facade = FacadeOptions::default();
        if let Some(size) = parsed("BULK_BATCH_SIZE") {
            facade.bulk_batch_size = size;
        }

        Self {
            database,
            facade,
            post_default_scope: env::var("POST_DEFAULT_SCOPE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}
