//! vid2audio-core: shared types, IDs, errors and configuration.
//!
//! This crate is the foundational dependency for the other vid2audio crates,
//! providing the typed job identifier, the trim window value type, a unified
//! error type, and the application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
