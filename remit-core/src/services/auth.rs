//! Auth service - registration, login, sessions and account administration
//!
//! Login flow: sanitize → validate → load user → lockout check → verify
//! password (and optional account number) → reset counter → mint token.
//! Unknown users and wrong passwords fail identically, including the time
//! spent hashing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::domain::result::{AuthFailure, Error, Result};
use crate::domain::{Claims, Role, SessionCookie, User, UserProfile};
use crate::services::access::within;
use crate::services::hasher::CredentialHasher;
use crate::services::lockout::{FailureOutcome, LockoutService, LockoutStatus};
use crate::services::logging::{LogEvent, SecurityEvent};
use crate::services::records::RotationReport;
use crate::services::requests::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest,
};
use crate::services::token::TokenIssuer;
use crate::services::ServiceContext;
use crate::validation::{PasswordPolicy, Validate, ValidationError};

/// Hashed once per process so unknown-user logins cost a real verify
const TIMING_PAD_PASSWORD: &str = "remit-timing-pad-Zq8!x";

/// A freshly authenticated session
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub claims: Claims,
    #[serde(skip)]
    pub cookie: SessionCookie,
    pub user: UserProfile,
}

pub struct AuthService {
    ctx: ServiceContext,
    hasher: Arc<CredentialHasher>,
    lockout: LockoutService,
    tokens: Arc<TokenIssuer>,
    timing_pad: OnceCell<String>,
}

impl AuthService {
    pub fn new(
        ctx: ServiceContext,
        hasher: Arc<CredentialHasher>,
        lockout: LockoutService,
        tokens: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            ctx,
            hasher,
            lockout,
            tokens,
            timing_pad: OnceCell::new(),
        }
    }

    pub fn lockout(&self) -> &LockoutService {
        &self.lockout
    }

    // === Registration & login ===

    /// Register a customer account
    pub async fn register(&self, req: &RegisterRequest) -> Result<UserProfile> {
        self.register_as(req, Role::Customer).await
    }

    /// Register with an explicit role (operator bootstrap of admin accounts)
    pub async fn register_as(&self, req: &RegisterRequest, role: Role) -> Result<UserProfile> {
        within(self.ctx.request_timeout, self.register_inner(req, role)).await
    }

    async fn register_inner(&self, req: &RegisterRequest, role: Role) -> Result<UserProfile> {
        let req = req.sanitized();
        req.validate()?;

        // Duplicates surface only from the unique indexes, after hashing
        let digest = self.hasher.hash(&req.password).await?;
        let mut user = User::new(&req.username, &req.email, digest, self.ctx.clock.now());
        user.role = role;
        user.full_name = req.full_name;
        user.id_number = req.id_number;
        user.account_number = req.account_number;

        let stored = self.ctx.codec.encode_user(&user)?;
        self.ctx.repo.insert_user(&stored).await.map_err(|e| match e {
            Error::Conflict(_) => duplicate_account(),
            other => other,
        })?;

        self.ctx.events.record(
            LogEvent::new(SecurityEvent::Registered)
                .with_user(user.id)
                .with_detail(role.as_str()),
        );
        tracing::info!(event = "registered", user_id = %user.id, role = role.as_str());
        Ok(UserProfile::from(&user))
    }

    /// Authenticate and mint a session
    pub async fn login(&self, req: &LoginRequest) -> Result<AuthSession> {
        within(self.ctx.request_timeout, self.login_inner(req)).await
    }

    async fn login_inner(&self, req: &LoginRequest) -> Result<AuthSession> {
        let req = req.sanitized();
        req.validate().map_err(|_| Error::invalid_credentials())?;

        let Some(stored) = self.ctx.repo.find_user_by_login(&req.login).await? else {
            self.pad_timing(&req.password).await?;
            self.ctx
                .events
                .record(LogEvent::new(SecurityEvent::LoginFailed).with_detail("unknown_login"));
            return Err(Error::invalid_credentials());
        };
        let mut user = self.ctx.codec.decode_user(stored)?;

        if let Err(e) = self.lockout.check(&user) {
            self.ctx
                .events
                .record(LogEvent::new(SecurityEvent::LoginRejectedLocked).with_user(user.id));
            return Err(e);
        }

        let password_ok = self.hasher.verify(&req.password, &user.password_hash).await?;
        let second_factor_ok = match req.account_number.as_deref() {
            Some(given) => account_numbers_match(given, user.account_number.as_deref()),
            None => true,
        };

        if !(password_ok && second_factor_ok) {
            self.on_failed_login(user.id).await?;
            return Err(Error::invalid_credentials());
        }

        self.lockout.record_success(user.id).await?;
        let now = self.ctx.clock.now();
        user.login_attempts = 0;
        user.lock_until = None;
        user.last_login_at = Some(now);

        if self.hasher.needs_rehash(&user.password_hash) {
            self.upgrade_digest(&user, &req.password).await;
        }

        let (token, claims) = self.tokens.issue(&user)?;
        let cookie = self.tokens.cookie(&token);
        self.ctx
            .events
            .record(LogEvent::new(SecurityEvent::LoginSucceeded).with_user(user.id));
        tracing::info!(event = "login_succeeded", user_id = %user.id);

        Ok(AuthSession {
            token,
            expires_at: claims.expires_at(),
            claims,
            cookie,
            user: UserProfile::from(&user),
        })
    }

    async fn on_failed_login(&self, user_id: Uuid) -> Result<()> {
        let outcome = self.lockout.record_failure(user_id).await?;
        self.ctx
            .events
            .record(LogEvent::new(SecurityEvent::LoginFailed).with_user(user_id));
        match outcome {
            FailureOutcome::Locked { .. } => {
                tracing::warn!(event = "account_locked", user_id = %user_id, "lockout threshold reached");
                self.ctx
                    .events
                    .record(LogEvent::new(SecurityEvent::AccountLocked).with_user(user_id));
            }
            FailureOutcome::Counted { attempts } => {
                tracing::debug!(user_id = %user_id, attempts, "failed login counted");
            }
            FailureOutcome::Rejected => {
                tracing::debug!(user_id = %user_id, "failed login not counted, lock already in force");
            }
        }
        Ok(())
    }

    /// Spend one verify on a real digest so a missing user costs the same
    async fn pad_timing(&self, password: &str) -> Result<()> {
        let digest = self
            .timing_pad
            .get_or_try_init(|| self.hasher.hash(TIMING_PAD_PASSWORD))
            .await?;
        self.hasher.verify(password, digest).await?;
        Ok(())
    }

    /// Replace an outdated digest after a successful login. Never fails the login.
    async fn upgrade_digest(&self, user: &User, password: &str) {
        let now = self.ctx.clock.now();
        let result = match self.hasher.hash(password).await {
            Ok(digest) => self.ctx.repo.update_password_hash(user.id, &digest, now).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => tracing::info!(user_id = %user.id, "password digest upgraded"),
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "password digest upgrade failed"),
        }
    }

    // === Sessions ===

    /// Verify a bearer token or cookie value
    pub fn verify_session(&self, token: &str) -> Result<Claims> {
        self.tokens.verify(token).map_err(|e| {
            let reason = match &e {
                Error::Authentication(AuthFailure::TokenExpired) => "expired",
                _ => "invalid",
            };
            self.ctx
                .events
                .record(LogEvent::new(SecurityEvent::TokenRejected).with_detail(reason));
            e
        })
    }

    /// Profile of the live account behind a session
    pub async fn current_user(&self, claims: &Claims) -> Result<UserProfile> {
        within(self.ctx.request_timeout, async {
            let id = self.ctx.caller(claims).await?.id;
            self.load_user(id).await.map(|user| UserProfile::from(&user))
        })
        .await
    }

    /// Sessions are stateless; logging out only clears the cookie
    pub fn logout(&self) -> SessionCookie {
        self.tokens.cleared_cookie()
    }

    // === Profile ===

    pub async fn update_profile(
        &self,
        claims: &Claims,
        req: &UpdateProfileRequest,
    ) -> Result<UserProfile> {
        within(self.ctx.request_timeout, async {
            let id = self.ctx.caller(claims).await?.id;
            let req = req.sanitized();
            req.validate()?;

            let mut user = self.load_user(id).await?;
            if let Some(name) = req.full_name {
                user.full_name = Some(name);
            }
            if let Some(id_number) = req.id_number {
                user.id_number = Some(id_number);
            }
            if let Some(account) = req.account_number {
                user.account_number = Some(account);
            }

            let now = self.ctx.clock.now();
            let pii = self.ctx.codec.encode_user_pii(&user)?;
            if !self.ctx.repo.update_user_pii(id, &pii, now).await? {
                return Err(Error::not_found("User not found"));
            }
            user.updated_at = now;
            Ok(UserProfile::from(&user))
        })
        .await
    }

    pub async fn change_password(&self, claims: &Claims, req: &ChangePasswordRequest) -> Result<()> {
        within(self.ctx.request_timeout, async {
            let id = self.ctx.caller(claims).await?.id;
            req.validate()?;

            let user = self.load_user(id).await?;
            self.lockout.check(&user)?;
            PasswordPolicy::default()
                .check_with_context(&req.new_password, Some(&user.username), Some(&user.email))
                .map_err(|issue| ValidationError::new("newPassword", issue.to_string()))?;

            if !self.hasher.verify(&req.current_password, &user.password_hash).await? {
                self.on_failed_login(id).await?;
                return Err(Error::invalid_credentials());
            }

            let digest = self.hasher.hash(&req.new_password).await?;
            self.ctx
                .repo
                .update_password_hash(id, &digest, self.ctx.clock.now())
                .await?;
            tracing::info!(event = "password_changed", user_id = %id);
            Ok(())
        })
        .await
    }

    /// Tombstone an account (the caller's own, or any as admin)
    pub async fn delete_user(&self, claims: &Claims, user_id: Uuid) -> Result<()> {
        within(self.ctx.request_timeout, async {
            let by = self.ctx.caller(claims).await?.require_self_or_admin(user_id)?;
            if !self
                .ctx
                .repo
                .soft_delete_user(user_id, self.ctx.clock.now())
                .await?
            {
                return Err(Error::not_found("User not found"));
            }
            self.ctx.events.record(
                LogEvent::new(SecurityEvent::UserDeleted)
                    .with_user(user_id)
                    .with_subject(by.to_string()),
            );
            Ok(())
        })
        .await
    }

    // === Lockout administration ===

    pub async fn lockout_status(&self, claims: &Claims, user_id: Uuid) -> Result<LockoutStatus> {
        within(self.ctx.request_timeout, async {
            self.ctx.caller(claims).await?.require_self_or_admin(user_id)?;
            let user = self.load_user(user_id).await?;
            Ok(self.lockout.status(&user))
        })
        .await
    }

    pub async fn unlock(&self, claims: &Claims, user_id: Uuid) -> Result<()> {
        within(self.ctx.request_timeout, async {
            let admin = self.ctx.caller(claims).await?.require_admin()?;
            if !self.lockout.unlock(user_id).await? {
                return Err(Error::not_found("User not found"));
            }
            self.ctx.events.record(
                LogEvent::new(SecurityEvent::AccountUnlocked)
                    .with_user(user_id)
                    .with_subject(admin.to_string()),
            );
            Ok(())
        })
        .await
    }

    /// Find a live user by username or email (admin)
    pub async fn find_user(&self, claims: &Claims, login: &str) -> Result<UserProfile> {
        within(self.ctx.request_timeout, async {
            self.ctx.caller(claims).await?.require_admin()?;
            let login = login.trim().to_lowercase();
            let stored = self
                .ctx
                .repo
                .find_user_by_login(&login)
                .await?
                .ok_or_else(|| Error::not_found("User not found"))?;
            Ok(UserProfile::from(&self.ctx.codec.decode_user(stored)?))
        })
        .await
    }

    // === Key rotation ===

    /// Re-encrypt every user's PII still under a retired key (admin).
    ///
    /// Each write is compare-and-set on the envelopes the sweep read, so a
    /// profile edit that lands mid-sweep wins and the row is skipped.
    pub async fn rotate_keys(&self, claims: &Claims) -> Result<RotationReport> {
        let admin = self.ctx.caller(claims).await?.require_admin()?;
        let mut report = RotationReport::default();
        for stored in self.ctx.repo.list_users().await? {
            report.scanned += 1;
            let Some(pii) = self.ctx.codec.rotate_user_pii(&stored) else {
                continue;
            };
            if self.ctx.repo.rewrap_user_pii(stored.id, &stored.pii(), &pii).await? {
                report.rotated += 1;
            } else {
                tracing::warn!(user_id = %stored.id, "user changed during rotation, skipped");
            }
        }
        self.ctx.events.record(
            LogEvent::new(SecurityEvent::KeysRotated)
                .with_user(admin)
                .with_detail(format!("users={}/{}", report.rotated, report.scanned)),
        );
        Ok(report)
    }

    async fn load_user(&self, id: Uuid) -> Result<User> {
        let stored = self
            .ctx
            .repo
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("User not found"))?;
        self.ctx.codec.decode_user(stored)
    }
}

fn duplicate_account() -> Error {
    Error::Conflict("Username or email is already registered".to_string())
}

/// Constant-time comparison; an unreadable stored value never matches
fn account_numbers_match(given: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(stored) => given.as_bytes().ct_eq(stored.as_bytes()).into(),
        None => false,
    }
}
