//! Account lockout guard
//!
//! `unlocked → (failure) → unlocked[n+1] → (n+1 ≥ threshold) → locked[until]`.
//! An elapsed lock behaves exactly like no lock. The counter itself lives in
//! the repository so that concurrent failures are counted atomically.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::User;
use crate::ports::{Clock, Repository};

pub const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;
pub const DEFAULT_LOCKOUT_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger a lock
    pub threshold: u32,
    pub duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LOCKOUT_THRESHOLD,
            duration: Duration::minutes(DEFAULT_LOCKOUT_MINUTES),
        }
    }
}

/// What a recorded failure did to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Counter incremented, still below the threshold
    Counted { attempts: u32 },
    /// This failure reached the threshold
    Locked { until: DateTime<Utc> },
    /// A lock was already in force (or the user vanished); nothing counted
    Rejected,
}

/// Operator view of an account's lockout state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockoutStatus {
    pub locked: bool,
    pub attempts_remaining: u32,
}

pub struct LockoutService {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
}

impl LockoutService {
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>, policy: LockoutPolicy) -> Self {
        Self {
            repo,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    /// Reject immediately while a lock is in force. Never reveals how long.
    pub fn check(&self, user: &User) -> Result<()> {
        if user.is_locked_at(self.clock.now()) {
            Err(Error::AccountLocked)
        } else {
            Ok(())
        }
    }

    /// Count one failed password check
    pub async fn record_failure(&self, user_id: Uuid) -> Result<FailureOutcome> {
        let now = self.clock.now();
        let until = now
            .checked_add_signed(self.policy.duration)
            .ok_or_else(|| Error::internal("lock expiry out of range"))?;
        let update = self
            .repo
            .record_failed_login(user_id, self.policy.threshold, until, now)
            .await?;

        Ok(match update {
            Some(u) => match u.lock_until {
                Some(until) => FailureOutcome::Locked { until },
                None => FailureOutcome::Counted {
                    attempts: u.login_attempts,
                },
            },
            None => FailureOutcome::Rejected,
        })
    }

    /// Reset the counter and clear any lock after a successful login
    pub async fn record_success(&self, user_id: Uuid) -> Result<()> {
        let now = self.clock.now();
        self.repo.reset_login_state(user_id, Some(now), now).await?;
        Ok(())
    }

    pub fn status(&self, user: &User) -> LockoutStatus {
        let locked = user.is_locked_at(self.clock.now());
        LockoutStatus {
            locked,
            attempts_remaining: if locked {
                0
            } else {
                self.policy.threshold.saturating_sub(user.login_attempts)
            },
        }
    }

    /// Clear the counter and lock without recording a login
    pub async fn unlock(&self, user_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        self.repo.reset_login_state(user_id, None, now).await
    }
}
