//! Field cipher - AES-256-GCM envelopes for PII columns
//!
//! Envelope layout (hex, colon-delimited):
//!
//! - `keyId:iv:tag:ciphertext` written for every new value
//! - `iv:tag:ciphertext` legacy, unversioned; tried against every known key
//!
//! The IV is 12 random bytes, the tag 16 bytes. A per-deployment AAD string
//! is bound to every ciphertext.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::domain::result::{Error, Result};
use crate::ports::{DataKey, KeyProvider};

/// AAD used when none is configured
pub const DEFAULT_AAD: &str = "remit:pii:v1";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Parsed envelope, still encrypted
struct Envelope<'a> {
    key_id: Option<&'a str>,
    iv: Vec<u8>,
    tag: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl<'a> Envelope<'a> {
    fn parse(value: &'a str) -> Option<Self> {
        let parts: Vec<&str> = value.split(':').collect();
        let (key_id, iv, tag, ct) = match parts.as_slice() {
            [key_id, iv, tag, ct] if !key_id.is_empty() => (Some(*key_id), *iv, *tag, *ct),
            [iv, tag, ct] => (None, *iv, *tag, *ct),
            _ => return None,
        };
        let iv = hex::decode(iv).ok()?;
        let tag = hex::decode(tag).ok()?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return None;
        }
        Some(Self {
            key_id,
            iv,
            tag,
            ciphertext: hex::decode(ct).ok()?,
        })
    }
}

/// Encrypts and decrypts individual field values
pub struct FieldCipher {
    keys: Arc<dyn KeyProvider>,
    aad: Vec<u8>,
}

impl FieldCipher {
    pub fn new(keys: Arc<dyn KeyProvider>, aad: impl Into<String>) -> Self {
        Self {
            keys,
            aad: aad.into().into_bytes(),
        }
    }

    /// Id of the key new envelopes are written with
    pub fn active_key_id(&self) -> String {
        self.keys.active_key().id
    }

    /// Encrypt under the active key
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let key = self.keys.active_key();
        let cipher = Aes256Gcm::new_from_slice(&key.bytes)
            .map_err(|_| Error::internal("invalid field encryption key"))?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &self.aad,
                },
            )
            .map_err(|_| Error::internal("field encryption failed"))?;

        // aes-gcm appends the tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(format!(
            "{}:{}:{}:{}",
            key.id,
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Encrypt an optional value, passing `None` through
    pub fn encrypt_opt(&self, plaintext: Option<&str>) -> Result<Option<String>> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    /// Decrypt an envelope.
    ///
    /// Returns `None` on any failure: tampering, wrong or unknown key, bad
    /// hex, wrong part count, non-UTF-8 plaintext.
    pub fn decrypt(&self, envelope: &str) -> Option<String> {
        let parsed = Envelope::parse(envelope)?;
        match parsed.key_id {
            Some(id) => {
                let key = self.keys.key(id)?;
                self.open(&key, &parsed, &self.aad)
            }
            None => self.keys.keys().iter().find_map(|key| {
                // Unversioned values may predate the AAD binding
                self.open(key, &parsed, &self.aad)
                    .or_else(|| self.open(key, &parsed, &[]))
            }),
        }
    }

    /// Whether an envelope is anything other than a versioned envelope
    /// under the active key
    pub fn needs_rotation(&self, envelope: &str) -> bool {
        match Envelope::parse(envelope) {
            Some(Envelope {
                key_id: Some(id), ..
            }) => id != self.keys.active_key().id,
            _ => true,
        }
    }

    /// Decrypt with whichever key wrote the envelope and encrypt again under
    /// the active key
    pub fn reencrypt(&self, envelope: &str) -> Result<String> {
        let plaintext = self
            .decrypt(envelope)
            .ok_or_else(|| Error::Decryption("envelope could not be decrypted".to_string()))?;
        self.encrypt(&plaintext)
    }

    fn open(&self, key: &DataKey, envelope: &Envelope<'_>, aad: &[u8]) -> Option<String> {
        let cipher = Aes256Gcm::new_from_slice(&key.bytes).ok()?;
        let mut sealed = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(&envelope.ciphertext);
        sealed.extend_from_slice(&envelope.tag);
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&envelope.iv),
                Payload { msg: &sealed, aad },
            )
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Keyring;

    fn cipher_with(ring: Keyring) -> FieldCipher {
        FieldCipher::new(Arc::new(ring), DEFAULT_AAD)
    }

    fn cipher() -> FieldCipher {
        cipher_with(Keyring::from_secret("k1", "test-encryption-secret").unwrap())
    }

    fn flip_hex_char(envelope: &str, part: usize, index: usize) -> String {
        let mut parts: Vec<String> = envelope.split(':').map(str::to_string).collect();
        let mut chars: Vec<char> = parts[part].chars().collect();
        chars[index] = if chars[index] == '0' { '1' } else { '0' };
        parts[part] = chars.into_iter().collect();
        parts.join(":")
    }

    #[test]
    fn test_round_trip() {
        let c = cipher();
        for value in ["Thandi Nkosi", "8001015009087", "", "Zoë"] {
            let envelope = c.encrypt(value).unwrap();
            assert_eq!(c.decrypt(&envelope).as_deref(), Some(value));
        }
    }

    #[test]
    fn test_envelope_layout() {
        let envelope = cipher().encrypt("secret").unwrap();
        let parts: Vec<&str> = envelope.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "k1");
        assert_eq!(parts[1].len(), IV_LEN * 2);
        assert_eq!(parts[2].len(), TAG_LEN * 2);
        assert_eq!(parts[3].len(), "secret".len() * 2);
        assert!(!envelope.contains("secret"));
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let c = cipher();
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn test_any_flipped_byte_fails() {
        let c = cipher();
        let envelope = c.encrypt("account 62001234567").unwrap();
        for part in 1..=3 {
            let len = envelope.split(':').nth(part).unwrap().len();
            for index in (0..len).step_by(2) {
                let tampered = flip_hex_char(&envelope, part, index);
                assert_eq!(c.decrypt(&tampered), None, "part {} index {}", part, index);
            }
        }
    }

    #[test]
    fn test_malformed_envelopes() {
        let c = cipher();
        assert_eq!(c.decrypt(""), None);
        assert_eq!(c.decrypt("not-an-envelope"), None);
        assert_eq!(c.decrypt("k1:zz:zz:zz"), None);
        assert_eq!(c.decrypt("a:b:c:d:e"), None);
        let envelope = c.encrypt("x").unwrap();
        let unknown = envelope.replacen("k1", "k9", 1);
        assert_eq!(c.decrypt(&unknown), None);
    }

    #[test]
    fn test_wrong_key_and_wrong_aad() {
        let envelope = cipher().encrypt("secret").unwrap();
        let other = cipher_with(Keyring::from_secret("k1", "another-secret").unwrap());
        assert_eq!(other.decrypt(&envelope), None);

        let other_aad = FieldCipher::new(
            Arc::new(Keyring::from_secret("k1", "test-encryption-secret").unwrap()),
            "remit:pii:v2",
        );
        assert_eq!(other_aad.decrypt(&envelope), None);
    }

    #[test]
    fn test_legacy_envelope_is_readable() {
        let c = cipher();
        let envelope = c.encrypt("legacy value").unwrap();
        let legacy = envelope.splitn(2, ':').nth(1).unwrap().to_string();
        assert_eq!(legacy.split(':').count(), 3);
        assert_eq!(c.decrypt(&legacy).as_deref(), Some("legacy value"));
        assert!(c.needs_rotation(&legacy));
    }

    #[test]
    fn test_rotation() {
        let old = cipher();
        let envelope = old.encrypt("rotate me").unwrap();
        assert!(!old.needs_rotation(&envelope));

        let rotated = cipher_with(
            Keyring::from_secret("k2", "new-encryption-secret")
                .unwrap()
                .with_retired("k1", "test-encryption-secret")
                .unwrap(),
        );
        assert!(rotated.needs_rotation(&envelope));
        assert_eq!(rotated.decrypt(&envelope).as_deref(), Some("rotate me"));

        let fresh = rotated.reencrypt(&envelope).unwrap();
        assert!(fresh.starts_with("k2:"));
        assert!(!rotated.needs_rotation(&fresh));
        assert_eq!(rotated.decrypt(&fresh).as_deref(), Some("rotate me"));
        assert_eq!(old.decrypt(&fresh), None);
    }

    #[test]
    fn test_reencrypt_unreadable_is_decryption_error() {
        let err = cipher().reencrypt("k1:00:00:00").unwrap_err();
        assert!(matches!(err, Error::Decryption(_)));
    }
}
