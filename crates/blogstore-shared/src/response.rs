//! Standardized response types (RFC 7807 compliant for errors).

use serde::{Deserialize, Serialize};

use blogstore_core::error::RepoError;

/// Standard successful response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

/// RFC 7807 Problem Details.
///
/// See: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// A short, human-readable summary of the problem type.
    pub title: String,

    /// The HTTP status code.
    pub status: u16,

    /// A human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            error_type: "about:blank".to_string(),
            title: title.into(),
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(404, "Not Found").with_detail(detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(409, "Conflict").with_detail(detail)
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(422, "Validation Failed").with_detail(detail)
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }
}

/// Status and message for a façade failure. Store-side failures are logged
/// and reported without their detail.
impl From<&RepoError> for ErrorResponse {
    fn from(err: &RepoError) -> Self {
        match err {
            RepoError::NotFound { .. } => ErrorResponse::not_found(err.to_string()),
            RepoError::Validation(msg) => ErrorResponse::validation(msg.clone()),
            RepoError::Conflict(msg) => ErrorResponse::conflict(msg.clone()),
            RepoError::Transaction { operation, source } => {
                let mut response = ErrorResponse::from(source.as_ref());
                if response.status < 500 {
                    response.detail = Some(format!("{operation}: {}", err.root_cause()));
                }
                response
            }
            RepoError::Connection(msg) => {
                tracing::error!(error = %msg, "Database connection error");
                ErrorResponse::internal_error()
            }
            RepoError::Query(msg) => {
                tracing::error!(error = %msg, "Database query error");
                ErrorResponse::internal_error()
            }
            RepoError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ErrorResponse::internal_error()
            }
        }
    }
}

impl From<RepoError> for ErrorResponse {
    fn from(err: RepoError) -> Self {
        ErrorResponse::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RepoError::not_found("Post", 3), 404),
            (RepoError::Validation("title is required".into()), 422),
            (RepoError::Conflict("slug taken".into()), 409),
            (RepoError::Query("syntax error".into()), 500),
            (RepoError::Connection("refused".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ErrorResponse::from(&err).status, status, "{err}");
        }
    }

    #[test]
    fn test_transaction_takes_the_status_of_its_cause() {
        let err = RepoError::Transaction {
            operation: "create_with_tags",
            source: Box::new(RepoError::Validation("tag label is required".into())),
        };
        let response = ErrorResponse::from(&err);
        assert_eq!(response.status, 422);
        assert_eq!(
            response.detail.as_deref(),
            Some("create_with_tags: Validation failed: tag label is required")
        );
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let response = ErrorResponse::from(RepoError::Query("SELECT secret".into()));
        assert_eq!(response.detail, None);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "about:blank");
        assert!(json.get("detail").is_none());
    }

    #[test]
    fn test_ok_envelope() {
        let json = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("message").is_none());
    }
}
