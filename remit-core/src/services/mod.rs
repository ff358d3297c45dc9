//! Service layer - business logic orchestration
//!
//! Leaf services (hasher, cipher, lockout, token, logging) know nothing of
//! each other. The auth and payment services compose them per request.

mod access;
pub mod auth;
pub mod cipher;
pub mod hasher;
pub mod lockout;
pub mod logging;
pub mod migration;
pub mod payments;
pub mod records;
pub mod requests;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use crate::ports::{Clock, Repository};

pub use auth::{AuthService, AuthSession};
pub use cipher::{FieldCipher, DEFAULT_AAD};
pub use hasher::{CredentialHasher, HashAlgorithm};
pub use lockout::{FailureOutcome, LockoutPolicy, LockoutService, LockoutStatus};
pub use logging::{LogEntry, LogEvent, LoggingService, SecurityEvent};
pub use migration::{MigrationResult, MigrationService};
pub use payments::{PaymentService, StatusChange};
pub use records::{RecordCodec, RotationReport};
pub use requests::{
    ChangePasswordRequest, CreatePaymentRequest, LoginRequest, RegisterRequest,
    UpdateBeneficiaryRequest, UpdateProfileRequest,
};
pub use token::TokenIssuer;

/// Collaborators shared by the request-level services
#[derive(Clone)]
pub struct ServiceContext {
    pub repo: Arc<dyn Repository>,
    pub codec: Arc<RecordCodec>,
    pub events: Arc<LoggingService>,
    pub clock: Arc<dyn Clock>,
    /// Cap on every auth or payment operation, hashing included
    pub request_timeout: Duration,
}
