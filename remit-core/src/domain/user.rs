//! User domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access role carried in session claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer" => Some(Role::Customer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// A registered portal user with PII in plaintext.
///
/// This is the in-memory view. The stored row (`ports::StoredUser`) holds
/// ciphertext envelopes instead; conversion happens in
/// `services::records::RecordCodec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Lowercased login name
    pub username: String,
    /// Lowercased email address
    pub email: String,
    /// bcrypt or argon2 digest (salt embedded)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub login_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,

    // =========================================================================
    // PII: `None` means the stored ciphertext was unreadable
    // =========================================================================
    pub full_name: Option<String>,
    pub id_number: Option<String>,
    pub account_number: Option<String>,

    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new customer
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role: Role::Customer,
            login_attempts: 0,
            lock_until: None,
            full_name: None,
            id_number: None,
            account_number: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether a lock is in force at `now`. An elapsed lock counts as unlocked.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.map_or(false, |until| until > now)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Account number with everything but the last four digits masked
    pub fn masked_account_number(&self) -> Option<String> {
        self.account_number.as_deref().map(mask_tail)
    }
}

/// Mask all but the last four characters
pub fn mask_tail(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let visible = chars.len().saturating_sub(4);
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < visible { '*' } else { *c })
        .collect()
}

/// Public projection returned to callers (no hash, no lock internals)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub full_name: Option<String>,
    pub account_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            full_name: user.full_name.clone(),
            account_number: user.masked_account_number(),
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}
