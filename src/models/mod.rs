//! Models Module - Data Structures & Configuration
//!
//! Single source of truth for the resolution record, configuration and
//! error types.

pub mod config;
pub mod errors;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
