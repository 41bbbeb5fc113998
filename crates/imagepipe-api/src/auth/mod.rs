//! Caller authentication

pub mod api_key;

pub use api_key::{authenticate, key_fingerprint, Caller, KeyStore, StaticKeyStore};
