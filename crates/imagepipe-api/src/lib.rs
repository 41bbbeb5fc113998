//! Imagepipe API Library
//!
//! HTTP intake for the image pipeline plus the wiring that runs the queue workers in the
//! same process.

pub mod api_doc;
pub mod auth;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod services;
pub mod setup;
pub mod state;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use services::{IncomingUpload, IntakeService};
pub use setup::Pipeline;
pub use state::AppState;
