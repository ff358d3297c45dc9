//! Caller identity checks and the per-request deadline shared by services

use std::future::Future;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::result::{AuthFailure, Error, Result};
use crate::domain::{Claims, Role};
use crate::ports::Repository;
use crate::services::ServiceContext;

/// The live account behind verified claims.
///
/// The role is the stored one, so a demotion takes effect before the
/// token expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<Uuid> {
        if self.is_admin() {
            Ok(self.id)
        } else {
            Err(Error::Forbidden("Administrator role required".to_string()))
        }
    }

    /// The caller may act on `owner`'s data when it is theirs or they are an admin
    pub fn require_self_or_admin(&self, owner: Uuid) -> Result<Uuid> {
        if self.id == owner || self.is_admin() {
            Ok(self.id)
        } else {
            Err(Error::Forbidden("Not permitted for this account".to_string()))
        }
    }
}

/// Resolve claims to a live account. Tombstoned or unknown subjects are
/// `TokenInvalid`, even while the token itself is unexpired.
pub(crate) async fn caller(repo: &dyn Repository, claims: &Claims) -> Result<Caller> {
    let id = claims
        .user_id()
        .ok_or(Error::Authentication(AuthFailure::TokenInvalid))?;
    let stored = repo
        .find_user_by_id(id)
        .await?
        .ok_or(Error::Authentication(AuthFailure::TokenInvalid))?;
    let role = Role::parse(&stored.role)
        .ok_or_else(|| Error::database(format!("unknown role '{}'", stored.role)))?;
    Ok(Caller { id, role })
}

impl ServiceContext {
    pub(crate) async fn caller(&self, claims: &Claims) -> Result<Caller> {
        caller(self.repo.as_ref(), claims).await
    }
}

/// Run `fut` under the request deadline
pub(crate) async fn within<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(timeout_ms = limit.as_millis() as u64, "request deadline exceeded");
            Err(Error::internal("request timed out"))
        }
    }
}
