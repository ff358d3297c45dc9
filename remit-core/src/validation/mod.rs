//! Input validation
//!
//! Every inbound field passes through two stages: a type-aware sanitizer
//! (`sanitize`) and a total check (`format`, `banking`, `password`). The
//! checks never panic and never allocate errors; they answer `bool` or
//! `Option`. Request types tie the two together through [`Validate`].

pub mod banking;
pub mod format;
pub mod password;
pub mod sanitize;

use std::fmt;

use crate::domain::result::Error;

pub use password::{PasswordIssue, PasswordPolicy};

/// First field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation {
            field: e.field,
            message: e.message,
        }
    }
}

/// Implemented by request types
pub trait Validate {
    /// Check every field, returning the first failure
    fn validate(&self) -> Result<(), ValidationError>;

    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Fail with `message` on `field` unless `ok`
pub fn ensure(ok: bool, field: &str, message: &str) -> Result<(), ValidationError> {
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new(field, message))
    }
}

/// Fail unless the value is present and non-blank
pub fn require<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::new(field, "is required")),
    }
}
