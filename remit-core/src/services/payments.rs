//! Payment service - submission, lookup and the status lifecycle

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Claims, Payment, PaymentStatus};
use crate::services::access::{within, Caller};
use crate::services::logging::{LogEvent, SecurityEvent};
use crate::services::records::RotationReport;
use crate::services::requests::{CreatePaymentRequest, UpdateBeneficiaryRequest};
use crate::services::ServiceContext;
use crate::validation::Validate;

/// A requested status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub to: PaymentStatus,
    /// Permit a change outside the transition table (admin only)
    pub force: bool,
}

impl StatusChange {
    pub fn to(status: PaymentStatus) -> Self {
        Self {
            to: status,
            force: false,
        }
    }

    pub fn forced(status: PaymentStatus) -> Self {
        Self {
            to: status,
            force: true,
        }
    }
}

pub struct PaymentService {
    ctx: ServiceContext,
}

impl PaymentService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Create a pending SWIFT payment owned by the caller
    pub async fn submit(&self, claims: &Claims, req: &CreatePaymentRequest) -> Result<Payment> {
        within(self.ctx.request_timeout, async {
            let owner = self.ctx.caller(claims).await?.id;
            let req = req.sanitized();
            req.validate()?;
            let amount = req
                .parsed_amount()
                .ok_or_else(|| Error::validation("amount", "is not a valid amount"))?;

            let mut payment = Payment::new(
                owner,
                amount,
                req.currency,
                req.beneficiary_country,
                self.ctx.clock.now(),
            );
            payment.beneficiary_name = Some(req.beneficiary_name);
            payment.beneficiary_account = Some(req.beneficiary_account);
            payment.swift_code = Some(req.swift_code);
            payment.reference = req.reference;

            let stored = self.ctx.codec.encode_payment(&payment)?;
            self.ctx.repo.insert_payment(&stored).await?;

            self.ctx.events.record(
                LogEvent::new(SecurityEvent::PaymentSubmitted)
                    .with_user(owner)
                    .with_subject(payment.id.to_string())
                    .with_detail(&payment.currency),
            );
            tracing::info!(event = "payment_submitted", payment_id = %payment.id, user_id = %owner);
            Ok(payment)
        })
        .await
    }

    /// A payment visible to the caller. Other customers' payments are `NotFound`.
    pub async fn get(&self, claims: &Claims, id: Uuid) -> Result<Payment> {
        within(self.ctx.request_timeout, async {
            let caller = self.ctx.caller(claims).await?;
            self.load_visible(&caller, id).await
        })
        .await
    }

    /// The caller's own payments, newest first
    pub async fn list_for_user(&self, claims: &Claims) -> Result<Vec<Payment>> {
        within(self.ctx.request_timeout, async {
            let owner = self.ctx.caller(claims).await?.id;
            self.ctx
                .repo
                .list_payments_for_user(owner)
                .await?
                .into_iter()
                .map(|stored| self.ctx.codec.decode_payment(stored))
                .collect()
        })
        .await
    }

    /// Every payment, optionally filtered by status (admin)
    pub async fn list_all(
        &self,
        claims: &Claims,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>> {
        within(self.ctx.request_timeout, async {
            self.ctx.caller(claims).await?.require_admin()?;
            self.ctx
                .repo
                .list_payments(status)
                .await?
                .into_iter()
                .map(|stored| self.ctx.codec.decode_payment(stored))
                .collect()
        })
        .await
    }

    /// Move a payment along its lifecycle (admin).
    ///
    /// Changes outside the transition table need `force`, and are recorded
    /// as `status_override`. The write is compare-and-set on the status read
    /// here, so a concurrent change makes this call fail with `Conflict`.
    pub async fn update_status(
        &self,
        claims: &Claims,
        id: Uuid,
        change: StatusChange,
    ) -> Result<Payment> {
        within(self.ctx.request_timeout, async {
            let caller = self.ctx.caller(claims).await?;
            let admin = caller.require_admin()?;
            let payment = self.load_visible(&caller, id).await?;
            self.transition(payment, change, admin).await
        })
        .await
    }

    /// Cancel the caller's own payment while it is pending or on hold
    pub async fn cancel(&self, claims: &Claims, id: Uuid) -> Result<Payment> {
        within(self.ctx.request_timeout, async {
            let caller = self.ctx.caller(claims).await?;
            let by = caller.id;
            let payment = self.load_visible(&caller, id).await?;
            if payment.user_id != by && !caller.is_admin() {
                return Err(Error::Forbidden("Not permitted for this payment".to_string()));
            }
            self.transition(payment, StatusChange::to(PaymentStatus::Cancelled), by)
                .await
        })
        .await
    }

    /// Replace beneficiary details while the payment is still pending
    pub async fn update_beneficiary(
        &self,
        claims: &Claims,
        id: Uuid,
        req: &UpdateBeneficiaryRequest,
    ) -> Result<Payment> {
        within(self.ctx.request_timeout, async {
            let caller = self.ctx.caller(claims).await?;
            let by = caller.id;
            let req = req.sanitized();
            req.validate()?;

            let mut payment = self.load_visible(&caller, id).await?;
            if payment.user_id != by {
                return Err(Error::Forbidden("Not permitted for this payment".to_string()));
            }
            if payment.status != PaymentStatus::Pending {
                return Err(Error::Conflict(format!(
                    "Beneficiary can only be changed while pending (payment is {})",
                    payment.status
                )));
            }

            payment.beneficiary_name = Some(req.beneficiary_name);
            payment.beneficiary_account = Some(req.beneficiary_account);
            payment.swift_code = Some(req.swift_code);

            let now = self.ctx.clock.now();
            let envelopes = self.ctx.codec.encode_beneficiary(&payment)?;
            if !self.ctx.repo.update_beneficiary(id, &envelopes, now).await? {
                return Err(Error::Conflict(
                    "Payment left the pending state before the update".to_string(),
                ));
            }
            payment.updated_at = now;
            Ok(payment)
        })
        .await
    }

    /// Tombstone a payment. Customers may only remove payments that never
    /// started processing.
    pub async fn delete(&self, claims: &Claims, id: Uuid) -> Result<()> {
        within(self.ctx.request_timeout, async {
            let caller = self.ctx.caller(claims).await?;
            let by = caller.id;
            let payment = self.load_visible(&caller, id).await?;
            if !caller.is_admin() {
                let removable = matches!(
                    payment.status,
                    PaymentStatus::Pending | PaymentStatus::Cancelled | PaymentStatus::Failed
                );
                if payment.user_id != by || !removable {
                    return Err(Error::Forbidden("Not permitted for this payment".to_string()));
                }
            }
            if !self
                .ctx
                .repo
                .soft_delete_payment(id, self.ctx.clock.now())
                .await?
            {
                return Err(Error::not_found("Payment not found"));
            }
            tracing::info!(payment_id = %id, by = %by, "payment deleted");
            Ok(())
        })
        .await
    }

    /// Re-encrypt every beneficiary still under a retired key (admin).
    ///
    /// Covers payments in any status. A payment whose beneficiary was edited
    /// after the sweep read it is skipped; the edit already wrote under the
    /// active key.
    pub async fn rotate_keys(&self, claims: &Claims) -> Result<RotationReport> {
        let admin = self.ctx.caller(claims).await?.require_admin()?;
        let mut report = RotationReport::default();
        for stored in self.ctx.repo.list_all_payments().await? {
            report.scanned += 1;
            let Some(envelopes) = self.ctx.codec.rotate_beneficiary(&stored) else {
                continue;
            };
            if self
                .ctx
                .repo
                .rewrap_beneficiary(stored.id, &stored.beneficiary(), &envelopes)
                .await?
            {
                report.rotated += 1;
            } else {
                tracing::warn!(payment_id = %stored.id, "payment changed during rotation, skipped");
            }
        }
        self.ctx.events.record(
            LogEvent::new(SecurityEvent::KeysRotated)
                .with_user(admin)
                .with_detail(format!("payments={}/{}", report.rotated, report.scanned)),
        );
        Ok(report)
    }

    async fn load_visible(&self, caller: &Caller, id: Uuid) -> Result<Payment> {
        let stored = self
            .ctx
            .repo
            .find_payment(id)
            .await?
            .filter(|p| p.user_id == caller.id || caller.is_admin())
            .ok_or_else(|| Error::not_found("Payment not found"))?;
        self.ctx.codec.decode_payment(stored)
    }

    async fn transition(
        &self,
        mut payment: Payment,
        change: StatusChange,
        by: Uuid,
    ) -> Result<Payment> {
        let from = payment.status;
        if from == change.to {
            return Err(Error::Conflict(format!("Payment is already {}", from)));
        }
        let in_table = from.can_transition_to(change.to);
        if !in_table && !change.force {
            return Err(Error::Conflict(format!(
                "Cannot change payment status from {} to {}",
                from, change.to
            )));
        }

        let now = self.ctx.clock.now();
        if !self
            .ctx
            .repo
            .update_payment_status(payment.id, from, change.to, by, now)
            .await?
        {
            return Err(Error::Conflict(
                "Payment status was changed by another request".to_string(),
            ));
        }

        let detail = format!("{}->{}", from, change.to);
        self.ctx.events.record(
            LogEvent::new(SecurityEvent::PaymentStatusChanged)
                .with_user(by)
                .with_subject(payment.id.to_string())
                .with_detail(&detail),
        );
        if !in_table {
            tracing::warn!(event = "status_override", payment_id = %payment.id, by = %by, %detail);
            self.ctx.events.record(
                LogEvent::new(SecurityEvent::StatusOverride)
                    .with_user(by)
                    .with_subject(payment.id.to_string())
                    .with_detail(&detail),
            );
        }

        payment.status = change.to;
        payment.status_updated_by = Some(by);
        payment.updated_at = now;
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::Role;
    use crate::ports::ManualClock;
    use crate::services::requests::{LoginRequest, RegisterRequest};
    use crate::RemitContext;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    async fn session(ctx: &RemitContext, username: &str, role: Role) -> Claims {
        let req = RegisterRequest {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "Str0ng!Passw0rd#".to_string(),
            full_name: None,
            id_number: None,
            account_number: None,
        };
        ctx.auth.register_as(&req, role).await.unwrap();
        let login = LoginRequest {
            login: username.to_string(),
            password: "Str0ng!Passw0rd#".to_string(),
            account_number: None,
        };
        ctx.auth.login(&login).await.unwrap().claims
    }

    fn request() -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount: "1250.50".to_string(),
            currency: "EUR".to_string(),
            beneficiary_name: "Hans Muller".to_string(),
            beneficiary_account: "DE89 3704 0044 0532 0130 00".to_string(),
            swift_code: "DEUTDEFF".to_string(),
            beneficiary_country: "DE".to_string(),
            reference: Some("Invoice 42".to_string()),
        }
    }

    async fn setup() -> (RemitContext, Claims, Claims) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ctx = RemitContext::in_memory(Config::for_tests(), clock).unwrap();
        let customer = session(&ctx, "sipho", Role::Customer).await;
        let admin = session(&ctx, "ops.admin", Role::Admin).await;
        (ctx, customer, admin)
    }

    #[tokio::test]
    async fn test_submit_and_read_back() {
        let (ctx, customer, _) = setup().await;
        let payment = ctx.payments.submit(&customer, &request()).await.unwrap();
        assert_eq!(payment.amount, Decimal::new(125050, 2));
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.provider, "SWIFT");

        let loaded = ctx.payments.get(&customer, payment.id).await.unwrap();
        assert_eq!(loaded.beneficiary_account.as_deref(), Some("DE89370400440532013000"));
        assert_eq!(ctx.payments.list_for_user(&customer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_customers_cannot_see_payment() {
        let (ctx, customer, _) = setup().await;
        let other = session(&ctx, "lerato", Role::Customer).await;
        let payment = ctx.payments.submit(&customer, &request()).await.unwrap();
        assert!(matches!(
            ctx.payments.get(&other, payment.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            ctx.payments.list_all(&other, None).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_follows_transition_table() {
        let (ctx, customer, admin) = setup().await;
        let id = ctx.payments.submit(&customer, &request()).await.unwrap().id;

        let p = ctx
            .payments
            .update_status(&admin, id, StatusChange::to(PaymentStatus::Processing))
            .await
            .unwrap();
        assert_eq!(p.status_updated_by, admin.user_id());

        // Backwards without override
        assert!(matches!(
            ctx.payments
                .update_status(&admin, id, StatusChange::to(PaymentStatus::Pending))
                .await,
            Err(Error::Conflict(_))
        ));
        // Customers never drive the lifecycle
        assert!(matches!(
            ctx.payments
                .update_status(&customer, id, StatusChange::to(PaymentStatus::Completed))
                .await,
            Err(Error::Forbidden(_))
        ));

        ctx.payments
            .update_status(&admin, id, StatusChange::to(PaymentStatus::Completed))
            .await
            .unwrap();
        let pending = ctx.payments.list_all(&admin, Some(PaymentStatus::Completed)).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_override_is_logged() {
        let (ctx, customer, admin) = setup().await;
        let id = ctx.payments.submit(&customer, &request()).await.unwrap().id;
        ctx.payments
            .update_status(&admin, id, StatusChange::to(PaymentStatus::Failed))
            .await
            .unwrap();
        let p = ctx
            .payments
            .update_status(&admin, id, StatusChange::forced(PaymentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(p.status, PaymentStatus::Pending);

        let overrides = ctx.events.by_event(SecurityEvent::StatusOverride, 10).unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].detail.as_deref(), Some("failed->pending"));
    }

    #[tokio::test]
    async fn test_cancel_and_beneficiary_edits() {
        let (ctx, customer, admin) = setup().await;
        let id = ctx.payments.submit(&customer, &request()).await.unwrap().id;

        let edit = UpdateBeneficiaryRequest {
            beneficiary_name: "Anna Schmidt".to_string(),
            beneficiary_account: "GB82WEST12345698765432".to_string(),
            swift_code: "NWBKGB2L".to_string(),
        };
        let p = ctx.payments.update_beneficiary(&customer, id, &edit).await.unwrap();
        assert_eq!(p.beneficiary_name.as_deref(), Some("Anna Schmidt"));

        ctx.payments.cancel(&customer, id).await.unwrap();
        assert!(matches!(
            ctx.payments.update_beneficiary(&customer, id, &edit).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            ctx.payments.cancel(&customer, id).await,
            Err(Error::Conflict(_))
        ));

        ctx.payments.delete(&customer, id).await.unwrap();
        assert!(ctx.payments.get(&admin, id).await.is_err());
    }

    #[tokio::test]
    async fn test_deleted_account_token_cannot_act() {
        let (ctx, customer, admin) = setup().await;
        let id = ctx.payments.submit(&customer, &request()).await.unwrap().id;
        let own = customer.user_id().unwrap();
        ctx.auth.delete_user(&customer, own).await.unwrap();

        // The token is unexpired but its account is gone
        let invalid = |r: Result<()>| {
            matches!(r, Err(Error::Authentication(crate::domain::result::AuthFailure::TokenInvalid)))
        };
        assert!(invalid(ctx.payments.submit(&customer, &request()).await.map(|_| ())));
        assert!(invalid(ctx.payments.list_for_user(&customer).await.map(|_| ())));
        assert!(invalid(ctx.payments.cancel(&customer, id).await.map(|_| ())));
        assert_eq!(ctx.payments.list_all(&admin, None).await.unwrap().len(), 1);

        // Same for a deleted administrator
        let admin_id = admin.user_id().unwrap();
        ctx.auth.delete_user(&admin, admin_id).await.unwrap();
        assert!(invalid(ctx.payments.list_all(&admin, None).await.map(|_| ())));
        assert!(invalid(
            ctx.payments
                .update_status(&admin, id, StatusChange::to(PaymentStatus::Processing))
                .await
                .map(|_| ())
        ));
    }

    #[tokio::test]
    async fn test_invalid_payment_rejected() {
        let (ctx, customer, _) = setup().await;
        let mut req = request();
        req.amount = "10.001".to_string();
        assert!(matches!(
            ctx.payments.submit(&customer, &req).await,
            Err(Error::Validation { ref field, .. }) if field == "amount"
        ));
        assert!(ctx.payments.list_for_user(&customer).await.unwrap().is_empty());
    }
}
