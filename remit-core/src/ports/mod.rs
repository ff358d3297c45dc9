//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. Services depend
//! only on these traits, never on a concrete adapter.

mod clock;
mod key_provider;
mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key_provider::{DataKey, KeyProvider};
pub use repository::{
    BeneficiaryEnvelopes, FailedLoginUpdate, Repository, StoredPayment, StoredUser,
    UserPiiEnvelopes,
};
