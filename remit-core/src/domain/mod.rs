//! Core domain entities
//!
//! Plain data records with their own invariants. No I/O, no encryption:
//! the repository layer owns the mapping to stored ciphertext.

mod payment;
mod session;
mod user;
pub mod result;

pub use payment::{Payment, PaymentStatus, PROVIDER_SWIFT};
pub use session::{Claims, SessionCookie, SESSION_COOKIE_NAME, TOKEN_ISSUER};
pub use user::{mask_tail, Role, User, UserProfile};
