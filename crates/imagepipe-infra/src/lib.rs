//! Imagepipe Infrastructure Library
//!
//! Shared infrastructure used by the intake service and the workers:
//! - Telemetry initialization (tracing subscriber)
//! - Per-caller sliding-window rate limiting
//! - HTTP middleware (request ID)

pub mod middleware;
pub mod rate_limit;
pub mod telemetry;

// Re-export commonly used types
pub use middleware::{get_request_id, request_id_middleware, RequestId};
pub use rate_limit::RateLimiter;
pub use telemetry::{init_telemetry, shutdown_telemetry};
