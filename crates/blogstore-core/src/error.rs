//! Domain-level error types.

use thiserror::Error;

/// Domain errors - business rule failures detected before touching the store.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown relation `{relation}` on {entity}")]
    UnknownRelation {
        entity: &'static str,
        relation: String,
    },

    #[error("Unknown column `{column}` on {entity}")]
    UnknownColumn {
        entity: &'static str,
        column: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Repository-level errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Query(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transaction `{operation}` rolled back: {source}")]
    Transaction {
        operation: &'static str,
        #[source]
        source: Box<RepoError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// The innermost error, looking through transaction wrappers.
    pub fn root_cause(&self) -> &RepoError {
        match self {
            RepoError::Transaction { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), RepoError::NotFound { .. })
    }
}

impl From<DomainError> for RepoError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Internal(msg) => RepoError::Internal(msg),
            other => RepoError::Validation(other.to_string()),
        }
    }
}
