//! Configuration management
//!
//! Settings come from an optional `settings.json` in the data directory,
//! overridden by environment variables. Secrets are only ever read from the
//! environment and are never written back.
//! ```json
//! {
//!   "security": { "bcryptCost": 12, "lockoutThreshold": 5, ... }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::adapters::{Keyring, DEFAULT_KEY_ID};
use crate::domain::result::{Error, Result};
use crate::services::cipher::DEFAULT_AAD;
use crate::services::hasher::{HashAlgorithm, MIN_PRODUCTION_BCRYPT_COST};
use crate::services::lockout::{LockoutPolicy, DEFAULT_LOCKOUT_MINUTES, DEFAULT_LOCKOUT_THRESHOLD};
use crate::services::token::DEFAULT_TOKEN_EXPIRY_HOURS;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_BCRYPT_COST: u32 = 12;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const MIN_SECRET_LEN: usize = 32;

/// Upper bounds that keep every derived deadline representable
pub const MAX_LOCKOUT_MINUTES: i64 = 525_600;
pub const MAX_TOKEN_EXPIRY_HOURS: i64 = 8_760;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3_600;

const DEV_JWT_SECRET: &str = "remit-development-jwt-secret-change-me";
const DEV_ENCRYPTION_SECRET: &str = "remit-development-encryption-secret-change-me";

/// Deployment environment, from `NODE_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// `production` and `test` are recognized; anything else is development
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    security: SecuritySettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecuritySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encryption_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encryption_aad: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bcrypt_cost: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lockout_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lockout_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_expiry_hours: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_timeout_secs: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Remit configuration
#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    pub jwt_secret: String,
    pub encryption_secret: String,
    pub encryption_key_id: String,
    /// Retired `(key id, secret)` pairs still needed to read old envelopes
    pub retired_keys: Vec<(String, String)>,
    pub encryption_aad: String,
    pub hash_algorithm: HashAlgorithm,
    pub lockout_threshold: u32,
    pub lockout_minutes: i64,
    pub token_expiry_hours: i64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            encryption_secret: DEV_ENCRYPTION_SECRET.to_string(),
            encryption_key_id: DEFAULT_KEY_ID.to_string(),
            retired_keys: Vec::new(),
            encryption_aad: DEFAULT_AAD.to_string(),
            hash_algorithm: HashAlgorithm::Bcrypt {
                cost: DEFAULT_BCRYPT_COST,
            },
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_minutes: DEFAULT_LOCKOUT_MINUTES,
            token_expiry_hours: DEFAULT_TOKEN_EXPIRY_HOURS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

// Secrets never reach logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let retired: Vec<&str> = self.retired_keys.iter().map(|(id, _)| id.as_str()).collect();
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("jwt_secret", &"[redacted]")
            .field("encryption_secret", &"[redacted]")
            .field("encryption_key_id", &self.encryption_key_id)
            .field("retired_keys", &retired)
            .field("encryption_aad", &self.encryption_aad)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("lockout_threshold", &self.lockout_threshold)
            .field("lockout_minutes", &self.lockout_minutes)
            .field("token_expiry_hours", &self.token_expiry_hours)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Load settings.json from the data directory, then apply the process environment
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with(data_dir, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`] with a custom environment lookup
    pub fn load_with(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = read_settings(&data_dir.join(SETTINGS_FILE))?;
        let mut config = Self::from_settings(&raw)?;
        config.apply_env(env)?;
        Ok(config)
    }

    /// Fast, deterministic settings for tests (bcrypt cost 4)
    pub fn for_tests() -> Self {
        Self {
            environment: Environment::Test,
            jwt_secret: "test-jwt-secret-0123456789abcdefghijklmnop".to_string(),
            encryption_secret: "test-encryption-secret-0123456789abcdefghij".to_string(),
            hash_algorithm: HashAlgorithm::Bcrypt { cost: 4 },
            request_timeout_secs: 30,
            ..Self::default()
        }
    }

    fn from_settings(raw: &SettingsFile) -> Result<Self> {
        let defaults = Self::default();
        let s = &raw.security;
        let hash_algorithm = match s.password_hash.as_deref() {
            Some(name) => parse_algorithm(name, s.bcrypt_cost)?,
            None => HashAlgorithm::Bcrypt {
                cost: s.bcrypt_cost.unwrap_or(DEFAULT_BCRYPT_COST),
            },
        };
        Ok(Self {
            environment: s.environment.unwrap_or(defaults.environment),
            encryption_key_id: s
                .encryption_key_id
                .clone()
                .unwrap_or(defaults.encryption_key_id),
            encryption_aad: s.encryption_aad.clone().unwrap_or(defaults.encryption_aad),
            hash_algorithm,
            lockout_threshold: s.lockout_threshold.unwrap_or(defaults.lockout_threshold),
            lockout_minutes: s.lockout_minutes.unwrap_or(defaults.lockout_minutes),
            token_expiry_hours: s.token_expiry_hours.unwrap_or(defaults.token_expiry_hours),
            request_timeout_secs: s
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            ..defaults
        })
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = env("NODE_ENV") {
            self.environment = Environment::parse(&value);
        }
        if let Some(value) = env("JWT_SECRET") {
            self.jwt_secret = value;
        }
        if let Some(value) = env("ENCRYPTION_KEY") {
            self.encryption_secret = value;
        }
        if let Some(value) = env("REMIT_ENCRYPTION_KEY_ID") {
            self.encryption_key_id = value.trim().to_string();
        }
        if let Some(value) = env("REMIT_RETIRED_KEYS") {
            self.retired_keys = parse_retired_keys(&value)?;
        }
        if let Some(value) = env("REMIT_ENCRYPTION_AAD") {
            self.encryption_aad = value;
        }
        if let Some(value) = env("REMIT_PASSWORD_HASH") {
            let cost = match self.hash_algorithm {
                HashAlgorithm::Bcrypt { cost } => Some(cost),
                HashAlgorithm::Argon2id => None,
            };
            self.hash_algorithm = parse_algorithm(&value, cost)?;
        }
        if let Some(value) = env("REMIT_BCRYPT_COST") {
            let cost = parse_number("REMIT_BCRYPT_COST", &value)?;
            if let HashAlgorithm::Bcrypt { .. } = self.hash_algorithm {
                self.hash_algorithm = HashAlgorithm::Bcrypt { cost };
            }
        }
        if let Some(value) = env("REMIT_LOCKOUT_THRESHOLD") {
            self.lockout_threshold = parse_number("REMIT_LOCKOUT_THRESHOLD", &value)?;
        }
        if let Some(value) = env("REMIT_LOCKOUT_MINUTES") {
            self.lockout_minutes = parse_number("REMIT_LOCKOUT_MINUTES", &value)?;
        }
        if let Some(value) = env("REMIT_TOKEN_EXPIRY_HOURS") {
            self.token_expiry_hours = parse_number("REMIT_TOKEN_EXPIRY_HOURS", &value)?;
        }
        if let Some(value) = env("REMIT_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("REMIT_REQUEST_TIMEOUT_SECS", &value)?;
        }
        Ok(())
    }

    /// Save non-secret settings, preserving keys this crate doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(SETTINGS_FILE);
        let mut settings = read_settings(&path)?;

        let s = &mut settings.security;
        s.environment = Some(self.environment);
        s.encryption_key_id = Some(self.encryption_key_id.clone());
        s.encryption_aad = Some(self.encryption_aad.clone());
        match self.hash_algorithm {
            HashAlgorithm::Bcrypt { cost } => {
                s.password_hash = Some("bcrypt".to_string());
                s.bcrypt_cost = Some(cost);
            }
            HashAlgorithm::Argon2id => {
                s.password_hash = Some("argon2id".to_string());
                s.bcrypt_cost = None;
            }
        }
        s.lockout_threshold = Some(self.lockout_threshold);
        s.lockout_minutes = Some(self.lockout_minutes);
        s.token_expiry_hours = Some(self.token_expiry_hours);
        s.request_timeout_secs = Some(self.request_timeout_secs);

        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Everything that makes this configuration unsafe to deploy
    pub fn findings(&self) -> Vec<String> {
        let mut findings = Vec::new();
        for (name, secret, default) in [
            ("JWT_SECRET", &self.jwt_secret, DEV_JWT_SECRET),
            ("ENCRYPTION_KEY", &self.encryption_secret, DEV_ENCRYPTION_SECRET),
        ] {
            if secret.is_empty() || secret == default {
                findings.push(format!("{} is not set (using the development default)", name));
            } else if secret.len() < MIN_SECRET_LEN {
                findings.push(format!(
                    "{} is shorter than {} characters",
                    name, MIN_SECRET_LEN
                ));
            }
        }
        if self.jwt_secret == self.encryption_secret {
            findings.push("JWT_SECRET and ENCRYPTION_KEY must differ".to_string());
        }
        if let HashAlgorithm::Bcrypt { cost } = self.hash_algorithm {
            if cost < MIN_PRODUCTION_BCRYPT_COST {
                findings.push(format!(
                    "bcrypt cost {} is below the production minimum of {}",
                    cost, MIN_PRODUCTION_BCRYPT_COST
                ));
            }
        }
        if self.lockout_threshold == 0 {
            findings.push("lockout threshold must be at least 1".to_string());
        }
        if self.lockout_minutes <= 0 {
            findings.push("lockout duration must be positive".to_string());
        }
        if self.token_expiry_hours <= 0 {
            findings.push("token expiry must be positive".to_string());
        }
        if self.request_timeout_secs == 0 {
            findings.push("request timeout must be positive".to_string());
        }
        findings
    }

    /// Reject unsafe settings in production; warn about them elsewhere.
    ///
    /// A bcrypt cost outside 4..=31 and durations above their maximum are
    /// rejected everywhere.
    pub fn validate(&self) -> Result<()> {
        if let HashAlgorithm::Bcrypt { cost } = self.hash_algorithm {
            if !(4..=31).contains(&cost) {
                return Err(Error::Config(format!(
                    "bcrypt cost {} is outside 4..=31",
                    cost
                )));
            }
        }
        for (name, value, max) in [
            ("lockout minutes", self.lockout_minutes, MAX_LOCKOUT_MINUTES),
            ("token expiry hours", self.token_expiry_hours, MAX_TOKEN_EXPIRY_HOURS),
        ] {
            if value > max {
                return Err(Error::Config(format!("{} {} exceeds {}", name, value, max)));
            }
        }
        if self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "request timeout {}s exceeds {}s",
                self.request_timeout_secs, MAX_REQUEST_TIMEOUT_SECS
            )));
        }
        let findings = self.findings();
        if findings.is_empty() {
            return Ok(());
        }
        if self.is_production() {
            return Err(Error::Config(findings.join("; ")));
        }
        for finding in &findings {
            tracing::warn!(environment = self.environment.as_str(), "{}", finding);
        }
        Ok(())
    }

    pub fn keyring(&self) -> Result<Keyring> {
        let mut ring = Keyring::from_secret(&self.encryption_key_id, &self.encryption_secret)?;
        for (id, secret) in &self.retired_keys {
            ring = ring.with_retired(id, secret)?;
        }
        Ok(ring)
    }

    pub fn lockout_policy(&self) -> Result<LockoutPolicy> {
        let duration = Duration::try_minutes(self.lockout_minutes).ok_or_else(|| {
            Error::Config(format!("lockout minutes {} out of range", self.lockout_minutes))
        })?;
        Ok(LockoutPolicy {
            threshold: self.lockout_threshold,
            duration,
        })
    }

    pub fn token_ttl(&self) -> Result<Duration> {
        Duration::try_hours(self.token_expiry_hours).ok_or_else(|| {
            Error::Config(format!("token expiry hours {} out of range", self.token_expiry_hours))
        })
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_secs)
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))
}

fn parse_algorithm(name: &str, bcrypt_cost: Option<u32>) -> Result<HashAlgorithm> {
    match name.trim().to_lowercase().as_str() {
        "bcrypt" => Ok(HashAlgorithm::Bcrypt {
            cost: bcrypt_cost.unwrap_or(DEFAULT_BCRYPT_COST),
        }),
        "argon2" | "argon2id" => Ok(HashAlgorithm::Argon2id),
        other => Err(Error::Config(format!(
            "unknown password hash algorithm '{}'",
            other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", name, value)))
}

/// `id=secret,id=secret`
fn parse_retired_keys(value: &str) -> Result<Vec<(String, String)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(id, secret)| (id.trim().to_string(), secret.to_string()))
                .filter(|(id, secret)| !id.is_empty() && !secret.is_empty())
                .ok_or_else(|| {
                    Error::Config("REMIT_RETIRED_KEYS entries must look like id=secret".to_string())
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_defaults_without_settings() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_with(dir.path(), env(&[])).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Bcrypt { cost: 12 });
        assert_eq!(config.lockout_policy().unwrap(), LockoutPolicy::default());
        assert_eq!(config.token_ttl().unwrap(), Duration::hours(24));
        assert_eq!(config.encryption_aad, "remit:pii:v1");
        // Development warns but loads
        assert!(!config.findings().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_settings_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"security":{"lockoutThreshold":3,"bcryptCost":13}}"#,
        )
        .unwrap();
        let config = Config::load_with(
            dir.path(),
            env(&[
                ("NODE_ENV", "test"),
                ("REMIT_BCRYPT_COST", "10"),
                ("REMIT_RETIRED_KEYS", "k0=old-secret-one, legacy=old-secret-two"),
            ]),
        )
        .unwrap();
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.lockout_threshold, 3);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Bcrypt { cost: 10 });
        assert_eq!(config.retired_keys.len(), 2);
        assert_eq!(config.keyring().unwrap().active_key_id(), "k1");
    }

    #[test]
    fn test_production_rejects_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_with(dir.path(), env(&[("NODE_ENV", "production")])).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("JWT_SECRET"));
        assert!(err.contains("ENCRYPTION_KEY"));
    }

    #[test]
    fn test_production_accepts_strong_settings() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_with(
            dir.path(),
            env(&[
                ("NODE_ENV", "production"),
                ("JWT_SECRET", "pQ3vX9kL2mN8bR5tY7wZ1cF4hJ6gD0sA"),
                ("ENCRYPTION_KEY", "eU8iO2pA5sD9fG3hJ7kL1zX4cV6bN0mQ"),
            ]),
        )
        .unwrap();
        assert!(config.validate().is_ok());

        let mut weak = config.clone();
        weak.hash_algorithm = HashAlgorithm::Bcrypt { cost: 10 };
        assert!(weak.validate().is_err());

        let mut same = config;
        same.encryption_secret = same.jwt_secret.clone();
        assert!(same.validate().unwrap_err().to_string().contains("must differ"));
    }

    #[test]
    fn test_bad_env_values() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_with(dir.path(), env(&[("REMIT_LOCKOUT_THRESHOLD", "five")])).is_err());
        assert!(Config::load_with(dir.path(), env(&[("REMIT_RETIRED_KEYS", "nokey")])).is_err());
        assert!(Config::load_with(dir.path(), env(&[("REMIT_PASSWORD_HASH", "md5")])).is_err());
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_with(
            dir.path(),
            env(&[("REMIT_LOCKOUT_MINUTES", "9223372036854775807")]),
        )
        .unwrap();
        assert!(!config.is_production());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lockout minutes"));
        assert!(config.lockout_policy().is_err());

        let mut config = Config::for_tests();
        config.token_expiry_hours = i64::MAX;
        assert!(config.validate().is_err());
        assert!(config.token_ttl().is_err());

        let mut config = Config::for_tests();
        config.request_timeout_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::for_tests();
        config.lockout_minutes = MAX_LOCKOUT_MINUTES;
        config.token_expiry_hours = MAX_TOKEN_EXPIRY_HOURS;
        assert!(config.validate().is_ok());
        assert!(config.lockout_policy().is_ok());
        assert!(config.token_ttl().is_ok());
    }

    #[test]
    fn test_save_preserves_unknown_keys_and_omits_secrets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            r#"{"theme":"dark","security":{"lockoutMinutes":45,"auditRetentionDays":90}}"#,
        )
        .unwrap();

        let mut config = Config::load_with(dir.path(), env(&[("JWT_SECRET", "super-secret-value")])).unwrap();
        assert_eq!(config.lockout_minutes, 45);
        config.lockout_threshold = 7;
        config.save(dir.path()).unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&saved).unwrap();
        assert_eq!(json["theme"], "dark");
        assert_eq!(json["security"]["auditRetentionDays"], 90);
        assert_eq!(json["security"]["lockoutThreshold"], 7);
        assert!(!saved.contains("super-secret-value"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let printed = format!("{:?}", Config::for_tests());
        assert!(!printed.contains("test-jwt-secret"));
        assert!(printed.contains("redacted"));
    }
}
