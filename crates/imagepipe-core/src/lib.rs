//! Imagepipe Core Library
//!
//! This crate provides the domain models, error types and configuration shared by the
//! intake service and the queue workers.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, IntakeConfig, QueueConfig, StorageConfig, WorkerConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
