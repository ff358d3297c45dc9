//! Session token claims and cookie transport

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::Role;

/// Issuer written into every session token
pub const TOKEN_ISSUER: &str = "remit";

/// Name of the cookie that mirrors the bearer token
pub const SESSION_COOKIE_NAME: &str = "remit_session";

/// JWT claims for a portal session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub iss: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
    /// Token ID
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// `Set-Cookie` value carrying the session token.
///
/// Always `HttpOnly` and `SameSite=Strict`; `Secure` is set in production.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub max_age_secs: i64,
    pub secure: bool,
}

impl SessionCookie {
    pub fn new(value: impl Into<String>, max_age_secs: i64, secure: bool) -> Self {
        Self {
            name: SESSION_COOKIE_NAME.to_string(),
            value: value.into(),
            max_age_secs,
            secure,
        }
    }

    /// Cookie that tells the browser to drop the session
    pub fn cleared(secure: bool) -> Self {
        Self::new("", 0, secure)
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
            self.name, self.value, self.max_age_secs
        )?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}
