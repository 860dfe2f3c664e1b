//! # Blogstore Infrastructure
//!
//! Concrete implementations of the ports defined in `blogstore-core`.
//! This crate holds the sea-orm entities, the SQL repositories, the
//! [`Persistence`] façade and Argon2 password hashing.
//!
//! ## Feature Flags
//!
//! - `full` (default) - Every backend enabled
//! - `postgres` - PostgreSQL driver
//! - `sqlite` - SQLite driver

pub mod auth;
pub mod database;

pub use auth::Argon2PasswordService;
pub use database::{
    DatabaseConfig, FacadeOptions, GlobalScope, Persistence, SqlBillingRepository,
    SqlCategoryRepository, SqlPostRepository, SqlTagRepository, SqlUserRepository,
};
