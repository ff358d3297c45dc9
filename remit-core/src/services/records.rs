//! Record codec - the only place plaintext entities meet stored ciphertext
//!
//! Encoding encrypts every PII field under the active key. Decoding opens
//! each envelope; an unreadable envelope becomes `None` on the entity and a
//! `decryption_failed` event, never an error for the whole read.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Payment, PaymentStatus, Role, User};
use crate::ports::{BeneficiaryEnvelopes, StoredPayment, StoredUser, UserPiiEnvelopes};
use crate::services::cipher::FieldCipher;
use crate::services::logging::{LogEvent, LoggingService, SecurityEvent};

/// Outcome of a key rotation sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub scanned: usize,
    pub rotated: usize,
}

pub struct RecordCodec {
    cipher: Arc<FieldCipher>,
    events: Arc<LoggingService>,
}

impl RecordCodec {
    pub fn new(cipher: Arc<FieldCipher>, events: Arc<LoggingService>) -> Self {
        Self { cipher, events }
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    // === Users ===

    pub fn encode_user(&self, user: &User) -> Result<StoredUser> {
        let pii = self.encode_user_pii(user)?;
        Ok(StoredUser {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role.as_str().to_string(),
            login_attempts: user.login_attempts,
            lock_until: user.lock_until,
            full_name_enc: pii.full_name,
            id_number_enc: pii.id_number,
            account_number_enc: pii.account_number,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
            deleted_at: user.deleted_at,
        })
    }

    pub fn encode_user_pii(&self, user: &User) -> Result<UserPiiEnvelopes> {
        Ok(UserPiiEnvelopes {
            full_name: self.cipher.encrypt_opt(user.full_name.as_deref())?,
            id_number: self.cipher.encrypt_opt(user.id_number.as_deref())?,
            account_number: self.cipher.encrypt_opt(user.account_number.as_deref())?,
        })
    }

    pub fn decode_user(&self, stored: StoredUser) -> Result<User> {
        let role = Role::parse(&stored.role)
            .ok_or_else(|| Error::database(format!("unknown role '{}'", stored.role)))?;
        let id = stored.id;
        Ok(User {
            id,
            username: stored.username,
            email: stored.email,
            password_hash: stored.password_hash,
            role,
            login_attempts: stored.login_attempts,
            lock_until: stored.lock_until,
            full_name: self.open(stored.full_name_enc.as_deref(), "full_name", id, None),
            id_number: self.open(stored.id_number_enc.as_deref(), "id_number", id, None),
            account_number: self.open(
                stored.account_number_enc.as_deref(),
                "account_number",
                id,
                None,
            ),
            last_login_at: stored.last_login_at,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            deleted_at: stored.deleted_at,
        })
    }

    /// Re-encrypt every PII envelope not under the active key.
    ///
    /// Returns `None` when nothing needed rotating. Unreadable envelopes are
    /// left untouched.
    pub fn rotate_user_pii(&self, stored: &StoredUser) -> Option<UserPiiEnvelopes> {
        let mut changed = false;
        let pii = UserPiiEnvelopes {
            full_name: self.rotate_field(
                stored.full_name_enc.as_deref(),
                "full_name",
                stored.id,
                &mut changed,
            ),
            id_number: self.rotate_field(
                stored.id_number_enc.as_deref(),
                "id_number",
                stored.id,
                &mut changed,
            ),
            account_number: self.rotate_field(
                stored.account_number_enc.as_deref(),
                "account_number",
                stored.id,
                &mut changed,
            ),
        };
        changed.then_some(pii)
    }

    // === Payments ===

    pub fn encode_payment(&self, payment: &Payment) -> Result<StoredPayment> {
        let beneficiary = self.encode_beneficiary(payment)?;
        Ok(StoredPayment {
            id: payment.id,
            user_id: payment.user_id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            provider: payment.provider.clone(),
            beneficiary_name_enc: beneficiary.name,
            beneficiary_account_enc: beneficiary.account,
            swift_code_enc: beneficiary.swift_code,
            beneficiary_country: payment.beneficiary_country.clone(),
            reference: payment.reference.clone(),
            status: payment.status.as_str().to_string(),
            status_updated_by: payment.status_updated_by,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
            deleted_at: payment.deleted_at,
        })
    }

    pub fn encode_beneficiary(&self, payment: &Payment) -> Result<BeneficiaryEnvelopes> {
        Ok(BeneficiaryEnvelopes {
            name: self.cipher.encrypt_opt(payment.beneficiary_name.as_deref())?,
            account: self.cipher.encrypt_opt(payment.beneficiary_account.as_deref())?,
            swift_code: self.cipher.encrypt_opt(payment.swift_code.as_deref())?,
        })
    }

    pub fn decode_payment(&self, stored: StoredPayment) -> Result<Payment> {
        let status = PaymentStatus::parse(&stored.status)
            .ok_or_else(|| Error::database(format!("unknown payment status '{}'", stored.status)))?;
        let (user, pid) = (stored.user_id, Some(stored.id));
        Ok(Payment {
            id: stored.id,
            user_id: stored.user_id,
            amount: stored.amount,
            currency: stored.currency,
            provider: stored.provider,
            beneficiary_name: self.open(
                stored.beneficiary_name_enc.as_deref(),
                "beneficiary_name",
                user,
                pid,
            ),
            beneficiary_account: self.open(
                stored.beneficiary_account_enc.as_deref(),
                "beneficiary_account",
                user,
                pid,
            ),
            swift_code: self.open(stored.swift_code_enc.as_deref(), "swift_code", user, pid),
            beneficiary_country: stored.beneficiary_country,
            reference: stored.reference,
            status,
            status_updated_by: stored.status_updated_by,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            deleted_at: stored.deleted_at,
        })
    }

    pub fn rotate_beneficiary(&self, stored: &StoredPayment) -> Option<BeneficiaryEnvelopes> {
        let mut changed = false;
        let beneficiary = BeneficiaryEnvelopes {
            name: self.rotate_field(
                stored.beneficiary_name_enc.as_deref(),
                "beneficiary_name",
                stored.user_id,
                &mut changed,
            ),
            account: self.rotate_field(
                stored.beneficiary_account_enc.as_deref(),
                "beneficiary_account",
                stored.user_id,
                &mut changed,
            ),
            swift_code: self.rotate_field(
                stored.swift_code_enc.as_deref(),
                "swift_code",
                stored.user_id,
                &mut changed,
            ),
        };
        changed.then_some(beneficiary)
    }

    // === Envelope helpers ===

    fn open(
        &self,
        envelope: Option<&str>,
        field: &str,
        user_id: Uuid,
        payment_id: Option<Uuid>,
    ) -> Option<String> {
        let envelope = envelope?;
        match self.cipher.decrypt(envelope) {
            Some(plaintext) => Some(plaintext),
            None => {
                tracing::warn!(
                    field,
                    user_id = %user_id,
                    payment_id = ?payment_id,
                    "stored field could not be decrypted"
                );
                let mut event = LogEvent::new(SecurityEvent::DecryptionFailed)
                    .with_user(user_id)
                    .with_detail(field);
                if let Some(pid) = payment_id {
                    event = event.with_subject(pid.to_string());
                }
                self.events.record(event);
                None
            }
        }
    }

    /// Rotated envelope, or the original when it is current or unreadable
    fn rotate_field(
        &self,
        envelope: Option<&str>,
        field: &str,
        user_id: Uuid,
        changed: &mut bool,
    ) -> Option<String> {
        let envelope = envelope?;
        if !self.cipher.needs_rotation(envelope) {
            return Some(envelope.to_string());
        }
        match self.cipher.reencrypt(envelope) {
            Ok(fresh) => {
                *changed = true;
                Some(fresh)
            }
            Err(e) => {
                tracing::warn!(field, user_id = %user_id, error = %e, "skipping unreadable envelope during rotation");
                Some(envelope.to_string())
            }
        }
    }
}
