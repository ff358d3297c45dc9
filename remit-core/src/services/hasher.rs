//! Credential hasher - slow adaptive password digests
//!
//! bcrypt by default, Argon2id as an alternative. Verification dispatches on
//! the digest prefix so accounts hashed under either algorithm keep working
//! while [`CredentialHasher::needs_rehash`] drives a gradual upgrade.
//! All hashing runs on the blocking pool under a timeout.

use std::time::Duration;

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;

use crate::domain::result::{Error, Result};
use crate::validation::password::MAX_PASSWORD_BYTES;

/// Minimum bcrypt cost accepted in production
pub const MIN_PRODUCTION_BCRYPT_COST: u32 = 12;

/// Argon2id parameters
const ARGON2_TIME_COST: u32 = 3;
const ARGON2_MEMORY_COST: u32 = 65536; // 64 MiB
const ARGON2_PARALLELISM: u32 = 4;

/// Which algorithm new digests are produced with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Bcrypt { cost: u32 },
    Argon2id,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Bcrypt {
            cost: MIN_PRODUCTION_BCRYPT_COST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestKind {
    Bcrypt,
    Argon2,
    Unknown,
}

fn digest_kind(digest: &str) -> DigestKind {
    if digest.starts_with("$2a$") || digest.starts_with("$2b$") || digest.starts_with("$2y$") {
        DigestKind::Bcrypt
    } else if digest.starts_with("$argon2") {
        DigestKind::Argon2
    } else {
        DigestKind::Unknown
    }
}

/// Cost field of a `$2b$NN$...` digest
fn bcrypt_cost(digest: &str) -> Option<u32> {
    digest.get(4..6)?.parse().ok()
}

fn argon2() -> Result<Argon2<'static>> {
    let params = Params::new(ARGON2_MEMORY_COST, ARGON2_TIME_COST, ARGON2_PARALLELISM, None)
        .map_err(|e| Error::internal(format!("Failed to create argon2 params: {:?}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn hash_blocking(algorithm: HashAlgorithm, password: &str) -> Result<String> {
    match algorithm {
        HashAlgorithm::Bcrypt { cost } => bcrypt::hash(password, cost)
            .map_err(|e| Error::internal(format!("bcrypt hashing failed: {}", e))),
        HashAlgorithm::Argon2id => {
            let salt = SaltString::generate(&mut OsRng);
            Ok(argon2()?
                .hash_password(password.as_bytes(), &salt)
                .map_err(|e| Error::internal(format!("argon2 hashing failed: {}", e)))?
                .to_string())
        }
    }
}

fn verify_blocking(password: &str, digest: &str) -> Result<bool> {
    match digest_kind(digest) {
        DigestKind::Bcrypt => bcrypt::verify(password, digest)
            .map_err(|e| Error::internal(format!("malformed bcrypt digest: {}", e))),
        DigestKind::Argon2 => {
            let parsed = PasswordHash::new(digest)
                .map_err(|e| Error::internal(format!("malformed argon2 digest: {}", e)))?;
            // Parameters come from the digest itself
            match Argon2::default().verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(Error::internal(format!("argon2 verification failed: {}", e))),
            }
        }
        DigestKind::Unknown => Err(Error::internal("unrecognized password digest format")),
    }
}

/// Password hashing and verification
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    algorithm: HashAlgorithm,
    timeout: Duration,
}

impl CredentialHasher {
    pub fn new(algorithm: HashAlgorithm, timeout: Duration) -> Self {
        Self { algorithm, timeout }
    }

    pub fn bcrypt(cost: u32, timeout: Duration) -> Self {
        Self::new(HashAlgorithm::Bcrypt { cost }, timeout)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Produce a salted digest. The salt is embedded in the returned string.
    pub async fn hash(&self, password: &str) -> Result<String> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(Error::validation(
                "password",
                format!("must be at most {} bytes", MAX_PASSWORD_BYTES),
            ));
        }
        let algorithm = self.algorithm;
        let password = password.to_string();
        self.run_blocking(move || hash_blocking(algorithm, &password))
            .await
    }

    /// Check a password against a stored digest of either algorithm.
    ///
    /// A malformed digest is an error, never a match.
    pub async fn verify(&self, password: &str, digest: &str) -> Result<bool> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }
        let password = password.to_string();
        let digest = digest.to_string();
        self.run_blocking(move || verify_blocking(&password, &digest))
            .await
    }

    /// Whether a digest should be replaced after a successful login:
    /// different algorithm, lower bcrypt cost, or weaker Argon2 parameters.
    pub fn needs_rehash(&self, digest: &str) -> bool {
        match (self.algorithm, digest_kind(digest)) {
            (HashAlgorithm::Bcrypt { cost }, DigestKind::Bcrypt) => {
                bcrypt_cost(digest).map_or(true, |c| c < cost)
            }
            (HashAlgorithm::Argon2id, DigestKind::Argon2) => match PasswordHash::new(digest) {
                Ok(parsed) => match Params::try_from(&parsed) {
                    Ok(params) => {
                        parsed.algorithm.as_str() != "argon2id"
                            || params.m_cost() < ARGON2_MEMORY_COST
                            || params.t_cost() < ARGON2_TIME_COST
                            || params.p_cost() < ARGON2_PARALLELISM
                    }
                    Err(_) => true,
                },
                Err(_) => true,
            },
            _ => true,
        }
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::internal(format!(
                "password hashing task failed: {}",
                join_error
            ))),
            Err(_) => Err(Error::internal("password hashing timed out")),
        }
    }
}
