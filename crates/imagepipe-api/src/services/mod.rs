//! Application services

pub mod intake;

pub use intake::{IncomingUpload, IntakeService};
