//! Utils Module - Helper Functions & Shared Utilities
//!
//! Constants, caches and ABI helpers shared across the crate.

pub mod cache;
pub mod constants;
pub mod decoder;

pub use cache::*;
pub use constants::*;
pub use decoder::*;
