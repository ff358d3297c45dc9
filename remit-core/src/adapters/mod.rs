//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the Repository port
//! - An in-process keyring for the KeyProvider port

pub mod duckdb;
pub mod keyring;

pub use self::duckdb::DuckDbRepository;
pub use keyring::{derive_key, generate_secret, Keyring, DEFAULT_KEY_ID};
