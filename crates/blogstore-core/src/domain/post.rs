use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::slug::slugify;
use super::user::User;
use crate::error::DomainError;

/// Post entity - a blog post owned by a user and filed under a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub likes: i64,
    pub dislikes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Set the title and recompute the slug from it.
    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), DomainError> {
        let title = title.into();
        self.slug = derive_slug(&title)?;
        self.title = title;
        Ok(())
    }

    /// `"{title} - {author name}"`, as shown in listings.
    pub fn title_with_author(&self, author: &User) -> String {
        format!("{} - {}", self.title, author.name)
    }
}

/// Validate a post title and derive its slug.
pub fn derive_slug(title: &str) -> Result<String, DomainError> {
    if title.trim().is_empty() {
        return Err(DomainError::Validation("post title is required".into()));
    }
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(DomainError::Validation(format!(
            "post title `{title}` has no letters or digits to build a slug from"
        )));
    }
    Ok(slug)
}

/// Fields required to insert a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub user_id: i64,
    pub category_id: i64,
    pub title: String,
    pub content: String,
    /// Defaults to the insert time.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewPost {
    pub fn new(
        user_id: i64,
        category_id: i64,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            category_id,
            title: title.into(),
            content: content.into(),
            created_at: None,
        }
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Check required fields and return the slug for the title.
    pub fn validate(&self) -> Result<String, DomainError> {
        if self.user_id <= 0 {
            return Err(DomainError::Validation("post user_id is required".into()));
        }
        if self.category_id <= 0 {
            return Err(DomainError::Validation(
                "post category_id is required".into(),
            ));
        }
        derive_slug(&self.title)
    }
}

/// Partial update of a post. Counters are not settable here; they only move
/// through increment and decrement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<i64>,
    pub user_id: Option<i64>,
}

impl PostChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn author(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.category_id.is_none()
            && self.user_id.is_none()
    }

    /// Validate the change set and return the new slug when the title moves.
    pub fn validate(&self) -> Result<Option<String>, DomainError> {
        if matches!(self.category_id, Some(id) if id <= 0) {
            return Err(DomainError::Validation("post category_id is invalid".into()));
        }
        if matches!(self.user_id, Some(id) if id <= 0) {
            return Err(DomainError::Validation("post user_id is invalid".into()));
        }
        self.title.as_deref().map(derive_slug).transpose()
    }
}

/// Post counters that support atomic increment/decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Likes,
    Dislikes,
}

impl Counter {
    pub fn column(self) -> &'static str {
        match self {
            Counter::Likes => "likes",
            Counter::Dislikes => "dislikes",
        }
    }
}
