//! Data models for the pipeline
//!
//! Each sub-module covers one stage: the intake request and its acceptance response, the
//! processing request message, the processed result and its manifest, dead-letter records
//! and completion records written by the notification worker.

mod completion;
mod dead_letter;
mod message;
mod result;
mod upload;

pub use completion::*;
pub use dead_letter::*;
pub use message::*;
pub use result::*;
pub use upload::*;
