//! In-process keyring implementing the KeyProvider port
//!
//! Keys are derived by SHA-256 of configured secrets. Rotation works by
//! adding a new active key and demoting the previous one to retired; old
//! envelopes stay readable until a rotation sweep re-encrypts them.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::domain::result::{Error, Result};
use crate::ports::{DataKey, KeyProvider};

/// Key id used when none is configured
pub const DEFAULT_KEY_ID: &str = "k1";

/// Static set of data keys with one active key
#[derive(Debug, Clone)]
pub struct Keyring {
    active: DataKey,
    retired: Vec<DataKey>,
}

impl Keyring {
    /// Build a keyring whose active key is derived from `secret`
    pub fn from_secret(key_id: &str, secret: &str) -> Result<Self> {
        validate_key_id(key_id)?;
        if secret.is_empty() {
            return Err(Error::Config("encryption secret is empty".to_string()));
        }
        Ok(Self {
            active: DataKey::new(key_id, derive_key(secret)),
            retired: Vec::new(),
        })
    }

    /// Add a retired key that can still decrypt but is never used to encrypt
    pub fn with_retired(mut self, key_id: &str, secret: &str) -> Result<Self> {
        validate_key_id(key_id)?;
        if key_id == self.active.id || self.retired.iter().any(|k| k.id == key_id) {
            return Err(Error::Config(format!("duplicate encryption key id '{}'", key_id)));
        }
        self.retired.push(DataKey::new(key_id, derive_key(secret)));
        Ok(self)
    }

    pub fn active_key_id(&self) -> &str {
        &self.active.id
    }
}

impl KeyProvider for Keyring {
    fn active_key(&self) -> DataKey {
        self.active.clone()
    }

    fn key(&self, id: &str) -> Option<DataKey> {
        if self.active.id == id {
            return Some(self.active.clone());
        }
        self.retired.iter().find(|k| k.id == id).cloned()
    }

    fn keys(&self) -> Vec<DataKey> {
        std::iter::once(self.active.clone())
            .chain(self.retired.iter().cloned())
            .collect()
    }
}

/// Derive a 32-byte key from a secret string
pub fn derive_key(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Key ids end up inside colon-delimited envelopes
fn validate_key_id(key_id: &str) -> Result<()> {
    let ok = !key_id.is_empty()
        && key_id.len() <= 32
        && key_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "invalid encryption key id '{}': use 1-32 characters of [A-Za-z0-9_-]",
            key_id
        )))
    }
}

/// Generate a random secret suitable for `JWT_SECRET` or `ENCRYPTION_KEY`
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation_is_deterministic() {
        assert_eq!(derive_key("secret"), derive_key("secret"));
        assert_ne!(derive_key("secret"), derive_key("secret2"));
    }

    #[test]
    fn test_lookup_by_id() {
        let ring = Keyring::from_secret("k2", "new-secret")
            .unwrap()
            .with_retired("k1", "old-secret")
            .unwrap();
        assert_eq!(ring.active_key().id, "k2");
        assert_eq!(ring.key("k1").unwrap().bytes, derive_key("old-secret"));
        assert!(ring.key("k9").is_none());
        let ids: Vec<String> = ring.keys().into_iter().map(|k| k.id).collect();
        assert_eq!(ids, vec!["k2", "k1"]);
    }

    #[test]
    fn test_rejects_bad_key_ids() {
        assert!(Keyring::from_secret("has:colon", "s").is_err());
        assert!(Keyring::from_secret("", "s").is_err());
        assert!(Keyring::from_secret("k1", "s").unwrap().with_retired("k1", "t").is_err());
    }

    #[test]
    fn test_generated_secrets_are_long_and_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert!(a.len() >= 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let ring = Keyring::from_secret("k1", "s").unwrap();
        let printed = format!("{:?}", ring.active_key());
        assert!(printed.contains("redacted"));
    }
}
