//! SQL persistence: entities, query translation and repositories.

mod billing_repo;
mod bulk;
mod catalog_repo;
mod connections;
mod eager;
mod errors;
mod facade;
mod filters;
mod post_query;
mod post_repo;
mod projected;
mod records;
mod schema;
mod scopes;
mod sql_base;
mod user_query;
mod user_repo;

pub mod entity;

pub use billing_repo::SqlBillingRepository;
pub use catalog_repo::{SqlCategoryRepository, SqlTagRepository};
pub use connections::{DatabaseConfig, connect};
pub use facade::{FacadeOptions, Persistence};
pub use post_repo::SqlPostRepository;
pub use schema::ensure_schema;
pub use scopes::GlobalScope;
pub use sql_base::{MIN_BULK_BATCH, SqlBaseRepository, StoredEntity};
pub use user_query::LATEST_POST_TITLE;
pub use user_repo::SqlUserRepository;

#[cfg(test)]
mod tests;
