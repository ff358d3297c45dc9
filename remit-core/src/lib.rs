//! Remit Core - security core of an international payments portal
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (User, Payment, Claims) and the error taxonomy
//! - **ports**: Trait definitions for external dependencies (Repository, KeyProvider, Clock)
//! - **services**: Hashing, field encryption, lockout, tokens, and the auth/payment services
//! - **adapters**: Concrete implementations (DuckDB, in-process keyring)
//! - **validation**: Total format checks and sanitizers for inbound fields

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;
pub mod validation;

use std::path::Path;
use std::sync::Arc;

use adapters::DuckDbRepository;
use config::Config;
use ports::{Clock, SystemClock};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, ErrorKind, OperationResult, Result};
pub use domain::{Claims, Payment, PaymentStatus, Role, User, UserProfile};

/// Main database file inside the data directory
pub const DB_FILENAME: &str = "remit.duckdb";

/// Main context for Remit operations
///
/// This is the primary entry point for all business logic. It holds
/// the database connection, configuration, and all services.
pub struct RemitContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub events: Arc<LoggingService>,
    pub cipher: Arc<FieldCipher>,
    pub tokens: Arc<TokenIssuer>,
    pub auth: AuthService,
    pub payments: PaymentService,
}

impl RemitContext {
    /// Open the data directory with settings from `settings.json` and the environment
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        Self::open(data_dir, config, Arc::new(SystemClock))
    }

    /// Open the data directory with an explicit configuration and clock
    pub fn open(data_dir: &Path, config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(data_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(DB_FILENAME))?);
        repository.ensure_schema()?;
        let events = Arc::new(LoggingService::new(data_dir, env!("CARGO_PKG_VERSION"))?);

        Self::assemble(config, repository, events, clock)
    }

    /// Fully in-memory context (tests, dry runs)
    pub fn in_memory(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let repository = Arc::new(DuckDbRepository::in_memory()?);
        repository.ensure_schema()?;
        let events = Arc::new(LoggingService::in_memory(env!("CARGO_PKG_VERSION"))?);

        Self::assemble(config, repository, events, clock)
    }

    fn assemble(
        config: Config,
        repository: Arc<DuckDbRepository>,
        events: Arc<LoggingService>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let keyring = Arc::new(config.keyring()?);
        let cipher = Arc::new(FieldCipher::new(keyring, config.encryption_aad.clone()));
        let codec = Arc::new(RecordCodec::new(Arc::clone(&cipher), Arc::clone(&events)));

        let ctx = ServiceContext {
            repo: repository.clone(),
            codec,
            events: Arc::clone(&events),
            clock: Arc::clone(&clock),
            request_timeout: config.request_timeout(),
        };

        let hasher = Arc::new(CredentialHasher::new(
            config.hash_algorithm,
            config.request_timeout(),
        ));
        let lockout = LockoutService::new(repository.clone(), Arc::clone(&clock), config.lockout_policy()?);
        let tokens = Arc::new(TokenIssuer::new(
            &config.jwt_secret,
            config.token_ttl()?,
            config.is_production(),
            clock,
        ));

        let auth = AuthService::new(ctx.clone(), hasher, lockout, Arc::clone(&tokens));
        let payments = PaymentService::new(ctx);

        tracing::debug!(
            environment = config.environment.as_str(),
            key_id = %cipher.active_key_id(),
            "remit context ready"
        );

        Ok(Self {
            config,
            repository,
            events,
            cipher,
            tokens,
            auth,
            payments,
        })
    }
}
