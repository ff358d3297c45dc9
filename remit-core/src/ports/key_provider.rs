//! Key provider port - source of field-encryption keys

use std::fmt;

/// A 256-bit data key and the identifier written into envelopes
#[derive(Clone)]
pub struct DataKey {
    pub id: String,
    pub bytes: [u8; 32],
}

impl DataKey {
    pub fn new(id: impl Into<String>, bytes: [u8; 32]) -> Self {
        Self {
            id: id.into(),
            bytes,
        }
    }
}

// Never print key material
impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataKey")
            .field("id", &self.id)
            .field("bytes", &"[redacted]")
            .finish()
    }
}

/// Supplies the active encryption key and any retired keys still needed
/// to read older envelopes.
pub trait KeyProvider: Send + Sync {
    /// Key used for every new encryption
    fn active_key(&self) -> DataKey;

    /// Look up a key by the id stored in an envelope
    fn key(&self, id: &str) -> Option<DataKey>;

    /// Every known key, active first. Used for unversioned envelopes.
    fn keys(&self) -> Vec<DataKey>;
}
