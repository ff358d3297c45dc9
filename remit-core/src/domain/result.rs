//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an authentication attempt or session check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    /// Unknown user or wrong password (deliberately indistinguishable)
    InvalidCredentials,
    /// Session token was genuine but its `exp` has passed
    TokenExpired,
    /// Session token was malformed, forged, or issued elsewhere
    TokenInvalid,
}

impl AuthFailure {
    fn public_message(&self) -> &'static str {
        match self {
            AuthFailure::InvalidCredentials => "Invalid credentials",
            AuthFailure::TokenExpired => "Session expired",
            AuthFailure::TokenInvalid => "Invalid session token",
        }
    }
}

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Authentication failed: {}", .0.public_message())]
    Authentication(AuthFailure),

    #[error("Account temporarily locked")]
    AccountLocked,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Stored field could not be decrypted: {0}")]
    Decryption(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Coarse classification used to build responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    AccountLocked,
    Forbidden,
    NotFound,
    Conflict,
    Decryption,
    Internal,
}

impl Error {
    /// Create a validation error for a field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-credentials error
    pub fn invalid_credentials() -> Self {
        Self::Authentication(AuthFailure::InvalidCredentials)
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::AccountLocked => ErrorKind::AccountLocked,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Decryption(_) => ErrorKind::Decryption,
            Error::Database(_)
            | Error::Config(_)
            | Error::Internal(_)
            | Error::Io(_)
            | Error::Json(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status equivalent
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::AccountLocked | ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Decryption | ErrorKind::Internal => 500,
        }
    }

    /// Message safe to hand back to a caller.
    ///
    /// Infrastructure detail is only included when `expose_internal` is set
    /// (never in production).
    pub fn public_message(&self, expose_internal: bool) -> String {
        match self {
            Error::Validation { field, message } => format!("{}: {}", field, message),
            Error::Authentication(failure) => failure.public_message().to_string(),
            Error::AccountLocked => "Account temporarily locked. Try again later.".to_string(),
            Error::Forbidden(msg) | Error::NotFound(msg) | Error::Conflict(msg) => msg.clone(),
            Error::Decryption(_) => "Stored data is unavailable".to_string(),
            _ if expose_internal => self.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error payload carried by a failed [`OperationResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Result-or-error object handed to the routing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub status: u16,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            status: 200,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a successful result with a non-200 status (e.g. 201 Created)
    pub fn ok_with_status(data: T, status: u16) -> Self {
        Self {
            status,
            ..Self::ok(data)
        }
    }

    /// Create a successful result with context
    pub fn ok_with_context(data: T, context: HashMap<String, serde_json::Value>) -> Self {
        Self {
            context: Some(context),
            ..Self::ok(data)
        }
    }

    /// Convert an error into a failed result.
    ///
    /// Internal errors are logged with full detail here; the caller only
    /// sees the generic message unless `expose_internal` is set.
    pub fn fail(error: &Error, expose_internal: bool) -> Self {
        if error.kind() == ErrorKind::Internal {
            tracing::error!(error = %error, "request failed with internal error");
        }
        let field = match error {
            Error::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        Self {
            success: false,
            status: error.status_code(),
            data: None,
            error: Some(ErrorBody {
                kind: error.kind(),
                message: error.public_message(expose_internal),
                field,
            }),
            context: None,
        }
    }

    /// Build from a service result
    pub fn from_result(result: Result<T>, expose_internal: bool) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(&e, expose_internal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.status, 200);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_validation_failure_carries_field() {
        let err = Error::validation("swift_code", "Invalid SWIFT/BIC code");
        let result: OperationResult<i32> = OperationResult::fail(&err, false);
        assert!(!result.success);
        assert_eq!(result.status, 400);
        let body = result.error.unwrap();
        assert_eq!(body.kind, ErrorKind::Validation);
        assert_eq!(body.field.as_deref(), Some("swift_code"));
    }

    #[test]
    fn test_internal_errors_are_hidden_in_production() {
        let err = Error::database("constraint violated on users_email_key");
        let hidden: OperationResult<()> = OperationResult::fail(&err, false);
        assert_eq!(hidden.status, 500);
        assert_eq!(hidden.error.unwrap().message, "Internal server error");

        let shown: OperationResult<()> = OperationResult::fail(&err, true);
        assert!(shown.error.unwrap().message.contains("users_email_key"));
    }

    #[test]
    fn test_auth_failures_do_not_leak_detail() {
        let err = Error::invalid_credentials();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.public_message(true), "Invalid credentials");

        assert_eq!(Error::AccountLocked.status_code(), 403);
        assert!(!Error::AccountLocked.public_message(true).contains("minute"));
    }

    #[test]
    fn test_from_result() {
        let err: Result<i32> = Err(Error::Authentication(AuthFailure::TokenExpired));
        let result: OperationResult<i32> = OperationResult::from_result(err, false);
        assert!(!result.success);
        assert_eq!(result.error.unwrap().message, "Session expired");
    }
}
