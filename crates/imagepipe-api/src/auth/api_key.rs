//! API key verification for intake callers.
//!
//! Keys are held as SHA-256 digests and compared in constant time. The caller identity
//! used for rate limiting is a short fingerprint of the digest, so raw keys never reach
//! logs or limiter state.

use async_trait::async_trait;
use imagepipe_core::AppError;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Source of valid API keys
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn validate(&self, api_key: &str) -> bool;
}

/// Authenticated caller, identified by the fingerprint of its key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub fingerprint: String,
}

impl Caller {
    pub fn from_key(api_key: &str) -> Self {
        Self {
            fingerprint: key_fingerprint(api_key),
        }
    }
}

fn digest(api_key: &str) -> [u8; 32] {
    Sha256::digest(api_key.as_bytes()).into()
}

/// First 8 bytes of the key digest, hex encoded
pub fn key_fingerprint(api_key: &str) -> String {
    hex::encode(&digest(api_key)[..8])
}

/// Key store backed by a fixed list of keys (the `API_KEYS` setting)
pub struct StaticKeyStore {
    digests: Vec<[u8; 32]>,
}

impl StaticKeyStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            digests: keys
                .into_iter()
                .filter(|k| !k.as_ref().is_empty())
                .map(|k| digest(k.as_ref()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

#[async_trait]
impl KeyStore for StaticKeyStore {
    async fn validate(&self, api_key: &str) -> bool {
        if api_key.is_empty() {
            return false;
        }
        let candidate = digest(api_key);
        // No early exit on match.
        self.digests
            .iter()
            .fold(subtle::Choice::from(0u8), |found, stored| {
                found | stored[..].ct_eq(&candidate[..])
            })
            .into()
    }
}

/// Validate `api_key` against `store`, returning the caller identity
pub async fn authenticate(store: &dyn KeyStore, api_key: Option<&str>) -> Result<Caller, AppError> {
    let api_key = api_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing API key".to_string()))?;

    if !store.validate(api_key).await {
        tracing::debug!(fingerprint = %key_fingerprint(api_key), "Rejected invalid API key");
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(Caller::from_key(api_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_store_accepts_only_configured_keys() {
        let store = StaticKeyStore::new(["key-one", "key-two", ""]);
        assert_eq!(store.len(), 2);
        assert!(store.validate("key-one").await);
        assert!(store.validate("key-two").await);
        assert!(!store.validate("key-three").await);
        assert!(!store.validate("").await);
    }

    #[tokio::test]
    async fn test_authenticate_missing_and_invalid_keys() {
        let store = StaticKeyStore::new(["secret"]);

        assert!(matches!(
            authenticate(&store, None).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&store, Some("  ")).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&store, Some("wrong")).await,
            Err(AppError::Unauthorized(_))
        ));

        let caller = authenticate(&store, Some("secret")).await.unwrap();
        assert_eq!(caller.fingerprint.len(), 16);
        assert_ne!(caller.fingerprint, "secret");
    }

    #[test]
    fn test_fingerprint_is_stable_per_key() {
        assert_eq!(key_fingerprint("a"), key_fingerprint("a"));
        assert_ne!(key_fingerprint("a"), key_fingerprint("b"));
    }
}
