//! Payment domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an international payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    OnHold,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::OnHold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::OnHold => "on_hold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == value.trim().to_lowercase())
    }

    /// Completed, failed and cancelled payments never move again without an override
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }

    /// Forward transitions permitted without an admin override
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, OnHold)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (OnHold, Processing)
                | (OnHold, Cancelled)
                | (OnHold, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only SWIFT routing is supported
pub const PROVIDER_SWIFT: &str = "SWIFT";

/// An international payment with beneficiary details in plaintext.
///
/// Beneficiary fields are `None` when the stored envelope is unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    /// ISO 4217 code, uppercase
    pub currency: String,
    pub provider: String,
    pub beneficiary_name: Option<String>,
    /// IBAN or digits-only account number
    pub beneficiary_account: Option<String>,
    pub swift_code: Option<String>,
    /// ISO 3166 alpha-2, uppercase
    pub beneficiary_country: String,
    pub reference: Option<String>,
    pub status: PaymentStatus,
    /// Who made the most recent status change
    pub status_updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Create a pending payment with required fields
    pub fn new(
        user_id: Uuid,
        amount: Decimal,
        currency: impl Into<String>,
        beneficiary_country: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            currency: currency.into(),
            provider: PROVIDER_SWIFT.to_string(),
            beneficiary_name: None,
            beneficiary_account: None,
            swift_code: None,
            beneficiary_country: beneficiary_country.into(),
            reference: None,
            status: PaymentStatus::Pending,
            status_updated_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Processing));
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Completed));
        assert!(PaymentStatus::OnHold.can_transition_to(PaymentStatus::Processing));
    }

    #[test]
    fn test_backward_and_terminal_transitions_rejected() {
        assert!(!PaymentStatus::Processing.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Cancelled.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Pending));
        for status in PaymentStatus::ALL {
            if status.is_terminal() {
                assert!(PaymentStatus::ALL.iter().all(|n| !status.can_transition_to(*n)));
            }
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(PaymentStatus::parse("on_hold"), Some(PaymentStatus::OnHold));
        assert_eq!(PaymentStatus::parse(" Completed "), Some(PaymentStatus::Completed));
        assert_eq!(PaymentStatus::parse("refunded"), None);
    }

    #[test]
    fn test_new_payment_is_pending_swift() {
        let p = Payment::new(Uuid::new_v4(), Decimal::new(10050, 2), "USD", "GB", Utc::now());
        assert_eq!(p.status, PaymentStatus::Pending);
        assert_eq!(p.provider, "SWIFT");
    }
}
