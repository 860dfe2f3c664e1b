//! Categories, tags and billing details.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A category groups posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tag label attached to posts through the `post_tag` join table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payment details; at most one row per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Billing {
    pub id: i64,
    pub user_id: i64,
    pub credit_card_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn validate_category_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::Validation("category name is required".into()));
    }
    Ok(name.to_string())
}

pub fn validate_tag_label(label: &str) -> Result<String, DomainError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(DomainError::Validation("tag label is required".into()));
    }
    Ok(label.to_string())
}

/// Normalize a card number to its digits; spaces and dashes are ignored.
pub fn normalize_card_number(raw: &str) -> Result<String, DomainError> {
    let digits: String = raw.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || !(12..=19).contains(&digits.len()) {
        return Err(DomainError::Validation(
            "credit card number must have 12 to 19 digits".into(),
        ));
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_number_normalization() {
        assert_eq!(
            normalize_card_number("4111 1111-1111 1111").unwrap(),
            "4111111111111111"
        );
        assert!(normalize_card_number("4111").is_err());
        assert!(normalize_card_number("4111 1111 1111 111x").is_err());
    }

    #[test]
    fn test_names_are_trimmed_and_required() {
        assert_eq!(validate_category_name("  News ").unwrap(), "News");
        assert!(validate_category_name(" ").is_err());
        assert_eq!(validate_tag_label("rust").unwrap(), "rust");
        assert!(validate_tag_label("").is_err());
    }
}
