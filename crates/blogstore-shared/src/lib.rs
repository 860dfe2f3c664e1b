//! # Blogstore Shared
//!
//! Response envelopes for whatever request layer sits in front of the
//! persistence façade: a success wrapper and RFC 7807 problem details built
//! from repository errors.

pub mod response;

pub use response::{ApiResponse, ErrorResponse};
