//! Repository port - persistence abstraction
//!
//! Rows crossing this port carry ciphertext envelopes for every sensitive
//! column. Nothing behind the port ever sees plaintext PII.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::PaymentStatus;

/// User row as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub login_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,
    pub full_name_enc: Option<String>,
    pub id_number_enc: Option<String>,
    pub account_number_enc: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Payment row as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPayment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub beneficiary_name_enc: Option<String>,
    pub beneficiary_account_enc: Option<String>,
    pub swift_code_enc: Option<String>,
    pub beneficiary_country: String,
    pub reference: Option<String>,
    pub status: String,
    pub status_updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StoredUser {
    /// The PII envelopes exactly as stored
    pub fn pii(&self) -> UserPiiEnvelopes {
        UserPiiEnvelopes {
            full_name: self.full_name_enc.clone(),
            id_number: self.id_number_enc.clone(),
            account_number: self.account_number_enc.clone(),
        }
    }
}

impl StoredPayment {
    /// The beneficiary envelopes exactly as stored
    pub fn beneficiary(&self) -> BeneficiaryEnvelopes {
        BeneficiaryEnvelopes {
            name: self.beneficiary_name_enc.clone(),
            account: self.beneficiary_account_enc.clone(),
            swift_code: self.swift_code_enc.clone(),
        }
    }
}

/// Encrypted PII columns of a user, written together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPiiEnvelopes {
    pub full_name: Option<String>,
    pub id_number: Option<String>,
    pub account_number: Option<String>,
}

/// Encrypted beneficiary columns of a payment, written together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeneficiaryEnvelopes {
    pub name: Option<String>,
    pub account: Option<String>,
    pub swift_code: Option<String>,
}

/// Counter state after a failed login was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLoginUpdate {
    /// Counter after the increment (0 when this failure triggered the lock)
    pub login_attempts: u32,
    /// Set when this failure triggered the lock
    pub lock_until: Option<DateTime<Utc>>,
}

/// Database repository abstraction
///
/// Every mutating method is a single atomic statement, so concurrent
/// callers never observe or produce half-applied state.
#[async_trait]
pub trait Repository: Send + Sync {
    // === Users ===

    /// Insert a new user. Duplicate usernames or emails are a `Conflict`.
    async fn insert_user(&self, user: &StoredUser) -> Result<()>;

    /// Get a live (not tombstoned) user by ID
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<StoredUser>>;

    /// Get a live user by username or email (already normalized)
    async fn find_user_by_login(&self, login: &str) -> Result<Option<StoredUser>>;

    /// All live users
    async fn list_users(&self) -> Result<Vec<StoredUser>>;

    /// Replace the encrypted PII columns
    async fn update_user_pii(
        &self,
        id: Uuid,
        pii: &UserPiiEnvelopes,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Swap the PII envelopes for re-encrypted ones of the same plaintext.
    ///
    /// Applies only while the stored envelopes still equal `old`, so a
    /// concurrent profile edit is never overwritten. `updated_at` is left
    /// alone. Returns `false` when the row changed or is gone.
    async fn rewrap_user_pii(
        &self,
        id: Uuid,
        old: &UserPiiEnvelopes,
        new: &UserPiiEnvelopes,
    ) -> Result<bool>;

    /// Replace the password digest (rehash on login, password change)
    async fn update_password_hash(&self, id: Uuid, hash: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Atomically record one failed login.
    ///
    /// Increments the counter unless a lock is in force at `now`. When the
    /// increment reaches `threshold`, the counter resets to 0 and
    /// `lock_until` is written in the same statement. Returns `None` when
    /// the user is missing, tombstoned or currently locked.
    async fn record_failed_login(
        &self,
        id: Uuid,
        threshold: u32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<FailedLoginUpdate>>;

    /// Reset the counter and clear any lock. `last_login_at` is written when given.
    async fn reset_login_state(
        &self,
        id: Uuid,
        last_login_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Tombstone a user
    async fn soft_delete_user(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    // === Payments ===

    async fn insert_payment(&self, payment: &StoredPayment) -> Result<()>;

    /// Get a live payment by ID
    async fn find_payment(&self, id: Uuid) -> Result<Option<StoredPayment>>;

    /// Live payments owned by a user, newest first
    async fn list_payments_for_user(&self, user_id: Uuid) -> Result<Vec<StoredPayment>>;

    /// Live payments across all users, newest first, optionally filtered
    async fn list_payments(&self, status: Option<PaymentStatus>) -> Result<Vec<StoredPayment>>;

    /// Compare-and-set the status. Returns `false` if the stored status was
    /// no longer `from`.
    async fn update_payment_status(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Replace the encrypted beneficiary columns while the payment is pending
    async fn update_beneficiary(
        &self,
        id: Uuid,
        beneficiary: &BeneficiaryEnvelopes,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Swap the beneficiary envelopes for re-encrypted ones, in any status.
    ///
    /// Compare-and-set on `old` like [`Repository::rewrap_user_pii`].
    async fn rewrap_beneficiary(
        &self,
        id: Uuid,
        old: &BeneficiaryEnvelopes,
        new: &BeneficiaryEnvelopes,
    ) -> Result<bool>;

    /// Every live payment, for key rotation sweeps
    async fn list_all_payments(&self) -> Result<Vec<StoredPayment>>;

    /// Tombstone a payment
    async fn soft_delete_payment(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;
}
