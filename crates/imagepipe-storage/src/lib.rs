//! Imagepipe Storage Library
//!
//! Object storage abstraction for the pipeline: the `Storage` trait plus a local
//! filesystem backend and an `object_store` backend (S3, GCS, in-memory).
//!
//! # Storage key format
//!
//! All backends share one key layout, generated in the `keys` module:
//!
//! - **Source image**: `uploads/{upload_id}`
//! - **Processed image**: `processed/{upload_id}`
//! - **Result manifest**: `results/{upload_id}.json`
//!
//! Keys are deterministic so redelivered messages address the same objects. Keys must not
//! contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
pub mod local;
pub mod object;
pub mod timed;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use imagepipe_core::StorageBackend;
pub use local::LocalStorage;
pub use object::ObjectStoreStorage;
pub use timed::TimedStorage;
pub use traits::{Storage, StorageError, StorageResult};
