//! Shared key generation for storage backends.

use imagepipe_core::constants::{PROCESSED_PREFIX, RESULTS_PREFIX, UPLOAD_PREFIX};
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Key of the raw uploaded image.
pub fn upload_key(upload_id: Uuid) -> String {
    format!("{}{}", UPLOAD_PREFIX, upload_id)
}

/// Key of the transformed image.
pub fn processed_key(upload_id: Uuid) -> String {
    format!("{}{}", PROCESSED_PREFIX, upload_id)
}

/// Key of the terminal result manifest.
pub fn result_manifest_key(upload_id: Uuid) -> String {
    format!("{}{}.json", RESULTS_PREFIX, upload_id)
}

/// Reject keys that could escape a backend's root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(upload_key(id), format!("uploads/{}", id));
        assert_eq!(processed_key(id), format!("processed/{}", id));
        assert_eq!(result_manifest_key(id), format!("results/{}.json", id));
        assert_eq!(upload_key(id), upload_key(id));
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        assert!(validate_key("uploads/abc").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/absolute").is_err());
        assert!(validate_key("").is_err());
    }
}
