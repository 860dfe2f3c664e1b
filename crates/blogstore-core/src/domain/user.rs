use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ports::PasswordService;

/// User entity - represents a user in the system.
///
/// The password hash is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub age: i32,
    pub banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a user. Only the hash of the password is kept.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub age: i32,
    pub banned: bool,
    password_hash: String,
}

impl NewUser {
    /// Validate the fields and hash the password.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: &str,
        age: i32,
        hasher: &dyn PasswordService,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let email = email.into();

        if name.trim().is_empty() {
            return Err(DomainError::Validation("user name is required".into()));
        }
        validate_email(&email)?;
        validate_password(password)?;
        if age < 0 {
            return Err(DomainError::Validation("user age cannot be negative".into()));
        }

        let password_hash = hasher
            .hash(password)
            .map_err(|e| DomainError::Internal(e.to_string()))?;

        Ok(Self {
            name,
            email,
            age,
            banned: false,
            password_hash,
        })
    }

    pub fn banned(mut self, banned: bool) -> Self {
        self.banned = banned;
        self
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

/// Partial update of a user.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub banned: Option<bool>,
    password_hash: Option<String>,
}

impl UserChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn age(mut self, age: i32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn banned(mut self, banned: bool) -> Self {
        self.banned = Some(banned);
        self
    }

    pub fn password(
        mut self,
        password: &str,
        hasher: &dyn PasswordService,
    ) -> Result<Self, DomainError> {
        validate_password(password)?;
        let hash = hasher
            .hash(password)
            .map_err(|e| DomainError::Internal(e.to_string()))?;
        self.password_hash = Some(hash);
        Ok(self)
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.age.is_none()
            && self.banned.is_none()
            && self.password_hash.is_none()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(DomainError::Validation("user name is required".into()));
        }
        if matches!(self.age, Some(age) if age < 0) {
            return Err(DomainError::Validation("user age cannot be negative".into()));
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if valid {
        Ok(())
    } else {
        Err(DomainError::Validation(format!(
            "`{email}` is not a valid email address"
        )))
    }
}

fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < 8 {
        return Err(DomainError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

/// Mask an email for logging: `j***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.find('@') {
        Some(at_pos) => {
            let (local, domain) = email.split_at(at_pos);
            let masked_local = match local.chars().next() {
                Some(first) if local.chars().count() > 1 => format!("{first}***"),
                _ => "***".to_string(),
            };
            format!("{masked_local}{domain}")
        }
        None => "***".to_string(),
    }
}
