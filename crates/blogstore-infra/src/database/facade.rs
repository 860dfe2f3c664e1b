//! The persistence façade: one pool, typed repositories on demand.

use sea_orm::DatabaseConnection;

use blogstore_core::error::RepoError;

use super::billing_repo::SqlBillingRepository;
use super::catalog_repo::{SqlCategoryRepository, SqlTagRepository};
use super::connections::{DatabaseConfig, connect};
use super::post_repo::SqlPostRepository;
use super::schema;
use super::scopes::{GlobalScope, GlobalScopes};
use super::sql_base::MIN_BULK_BATCH;
use super::user_repo::SqlUserRepository;

/// Tunables shared by every repository.
#[derive(Debug, Clone, Copy)]
pub struct FacadeOptions {
    /// Rows per bulk statement; raised to the floor of 100 when lower.
    pub bulk_batch_size: u64,
}

impl Default for FacadeOptions {
    fn default() -> Self {
        Self {
            bulk_batch_size: MIN_BULK_BATCH,
        }
    }
}

/// Entry point handing out repositories that share one connection pool.
///
/// ```ignore
/// let store = Persistence::connect(&DatabaseConfig::new("sqlite::memory:"), FacadeOptions::default()).await?;
/// store.ensure_schema().await?;
/// let post = store.posts().find_by_slug("hello-world").await?;
/// ```
#[derive(Clone)]
pub struct Persistence {
    db: DatabaseConnection,
    options: FacadeOptions,
    post_scopes: GlobalScopes,
}

impl Persistence {
    pub async fn connect(config: &DatabaseConfig, options: FacadeOptions) -> Result<Self, RepoError> {
        let db = connect(config).await?;
        Ok(Self::from_connection(db, options))
    }

    pub fn from_connection(db: DatabaseConnection, options: FacadeOptions) -> Self {
        Self {
            db,
            options,
            post_scopes: GlobalScopes::default(),
        }
    }

    /// Create missing tables.
    pub async fn ensure_schema(&self) -> Result<(), RepoError> {
        schema::ensure_schema(&self.db).await
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Attach a default filter to every post read from now on, whether it
    /// goes through `posts()` or reaches posts from another repository.
    pub fn with_post_global_scope(mut self, scope: impl Into<GlobalScope>) -> Self {
        let scope = scope.into();
        tracing::debug!(scope = scope.name(), "Registering post global scope");
        self.post_scopes.push(scope);
        self
    }

    pub fn posts(&self) -> SqlPostRepository {
        SqlPostRepository::new(self.db.clone())
            .with_batch_size(self.options.bulk_batch_size)
            .with_scopes(self.post_scopes.clone())
    }

    pub fn users(&self) -> SqlUserRepository {
        SqlUserRepository::new(self.db.clone()).with_post_scopes(self.post_scopes.clone())
    }

    pub fn categories(&self) -> SqlCategoryRepository {
        SqlCategoryRepository::new(self.db.clone()).with_post_scopes(self.post_scopes.clone())
    }

    pub fn tags(&self) -> SqlTagRepository {
        SqlTagRepository::new(self.db.clone()).with_post_scopes(self.post_scopes.clone())
    }

    pub fn billings(&self) -> SqlBillingRepository {
        SqlBillingRepository::new(self.db.clone()).with_post_scopes(self.post_scopes.clone())
    }
}
