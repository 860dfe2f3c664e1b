//! # Blogstore Core
//!
//! The domain layer of the blogstore persistence façade.
//! This crate contains entities, query descriptions and the ports that the
//! infrastructure crate implements. It has zero database dependencies.

pub mod domain;
pub mod error;
pub mod ports;
pub mod query;

pub use error::{DomainError, RepoError};
